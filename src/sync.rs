use std::{sync::Arc, time::Duration};

use crate::{
    clock::Clock,
    domain::{Settings, TransactionWindow},
    error::{SyncError, with_timeout},
    providers::DataProvider,
    settings::SettingsManager,
    store::{BALANCE_STREAM, ResultSink, TRANSACTIONS_STREAM},
};

/// Outcome of one sync attempt. Each half succeeds or fails on its own.
#[derive(Debug)]
pub struct SyncReport {
    pub balance: Result<(), SyncError>,
    pub transactions: Result<TransactionWindow, SyncError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.balance.is_ok() && self.transactions.is_ok()
    }
}

struct SyncContext {
    access_token: String,
    account_id: String,
}

fn context(settings: &Settings) -> Result<SyncContext, SyncError> {
    let tokens = settings.tokens.as_ref().ok_or(SyncError::Unauthenticated)?;
    let account_id = settings.account_id.as_ref().ok_or(SyncError::NotConfigured)?;

    Ok(SyncContext {
        access_token: tokens.access_token.clone(),
        account_id: account_id.clone(),
    })
}

pub struct DataSync {
    settings: Arc<SettingsManager>,
    provider: Arc<dyn DataProvider>,
    sink: Arc<dyn ResultSink>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    initial_lookback: chrono::Duration,
}

impl DataSync {
    pub fn new(
        settings: Arc<SettingsManager>,
        provider: Arc<dyn DataProvider>,
        sink: Arc<dyn ResultSink>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        initial_lookback: chrono::Duration,
    ) -> Self {
        DataSync {
            settings,
            provider,
            sink,
            clock,
            timeout,
            initial_lookback,
        }
    }

    async fn load_context(&self) -> Result<(Settings, SyncContext), SyncError> {
        let settings = self
            .settings
            .get()
            .await
            .map_err(|err| SyncError::PersistFailed(err.to_string()))?;
        let context = context(&settings)?;
        Ok((settings, context))
    }

    async fn write_sink(&self, stream_key: &str, payload: serde_json::Value) -> Result<(), SyncError> {
        with_timeout(
            self.timeout,
            &format!("write {}", stream_key),
            self.sink.write(stream_key, &payload),
        )
        .await
        .map_err(SyncError::PersistFailed)
    }

    pub async fn sync_balance(&self) -> Result<(), SyncError> {
        let (_, context) = self.load_context().await?;

        let balance = with_timeout(
            self.timeout,
            "get balance",
            self.provider
                .get_balance(&context.access_token, &context.account_id),
        )
        .await
        .map_err(SyncError::FetchFailed)
        .inspect_err(|err| {
            tracing::error!("Balance sync failed for account_id={}: {}", &context.account_id, err)
        })?;

        let payload = serde_json::to_value(&balance)
            .map_err(|err| SyncError::PersistFailed(err.to_string()))?;
        self.write_sink(BALANCE_STREAM, payload)
            .await
            .inspect_err(|err| tracing::error!("Error saving balance: {}", err))?;

        tracing::info!("Saved balance for account_id={}", &context.account_id);
        Ok(())
    }

    /// Fetches `[retrieve_from, now)` and advances the cursor to `now` only once
    /// the results have been written to the sink.
    pub async fn sync_transactions(&self) -> Result<TransactionWindow, SyncError> {
        let (settings, context) = self.load_context().await?;

        let to = self.clock.now();
        let from = settings
            .retrieve_from
            .unwrap_or_else(|| to - self.initial_lookback);
        let window = TransactionWindow { from, to };

        let transactions = with_timeout(
            self.timeout,
            "get transactions",
            self.provider
                .get_transactions(&context.access_token, &context.account_id, from, to),
        )
        .await
        .map_err(SyncError::FetchFailed)
        .inspect_err(|err| {
            tracing::error!(
                "Transaction sync failed for account_id={}: {}",
                &context.account_id,
                err
            )
        })?;

        tracing::info!(
            "Retrieved {} transactions for account_id={} from={} to={}",
            transactions.len(),
            &context.account_id,
            from,
            to
        );

        let payload = serde_json::to_value(&transactions)
            .map_err(|err| SyncError::PersistFailed(err.to_string()))?;
        self.write_sink(TRANSACTIONS_STREAM, payload)
            .await
            .inspect_err(|err| tracing::error!("Error saving transactions: {}", err))?;

        self.settings
            .update(|settings| {
                // A slower, older window finishing late must not rewind the cursor.
                if settings.retrieve_from.is_none_or(|current| current < to) {
                    settings.retrieve_from = Some(to);
                }
            })
            .await
            .map_err(|err| SyncError::PersistFailed(err.to_string()))
            .inspect_err(|err| tracing::error!("Error advancing transaction cursor: {}", err))?;

        Ok(window)
    }

    /// Runs both halves concurrently once the preconditions hold. An error here
    /// means nothing was attempted.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        self.load_context().await?;

        let (balance, transactions) =
            futures::join!(self.sync_balance(), self.sync_transactions());

        let report = SyncReport {
            balance,
            transactions,
        };
        if report.is_success() {
            tracing::info!("Data sync completed");
        } else {
            tracing::warn!("Data sync completed with errors: {:?}", report);
        }
        Ok(report)
    }
}
