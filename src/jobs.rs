use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;

use crate::{
    clock::Clock,
    credentials::CredentialManager,
    error::{AuthError, SyncError},
    settings::SettingsManager,
    sync::{DataSync, SyncReport},
};

pub const TICK_PERIOD: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug)]
pub enum TickOutcome {
    /// No tokens yet; the operator has to authorise first.
    Unauthenticated,
    /// Token refresh or settings access failed, retried next tick.
    AuthFailed(AuthError),
    /// Tokens present but no account selected.
    NotConfigured,
    NotDue { next_data_refresh: DateTime<Utc> },
    Synced(SyncReport),
    SyncSkipped(SyncError),
}

/// Drives background work: token validation on every tick and a data sync
/// whenever the configured interval has elapsed.
pub struct Scheduler {
    credentials: Arc<CredentialManager>,
    sync: Arc<DataSync>,
    settings: Arc<SettingsManager>,
    clock: Arc<dyn Clock>,
    next_data_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(
        credentials: Arc<CredentialManager>,
        sync: Arc<DataSync>,
        settings: Arc<SettingsManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Scheduler {
            credentials,
            sync,
            settings,
            clock,
            next_data_refresh: Mutex::new(None),
        }
    }

    pub fn next_data_refresh(&self) -> Option<DateTime<Utc>> {
        *self
            .next_data_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks auth and configuration, returning the refresh interval in minutes
    /// when a sync may run.
    async fn prepare(&self) -> Result<u32, TickOutcome> {
        match self.credentials.ensure_valid_token().await {
            Ok(()) => {}
            Err(AuthError::Unauthenticated) => {
                tracing::info!("No tokens stored, skipping until authorised");
                return Err(TickOutcome::Unauthenticated);
            }
            Err(err) => {
                tracing::error!("Unable to validate access token: {}", err);
                return Err(TickOutcome::AuthFailed(err));
            }
        }

        let settings = match self.settings.get().await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::error!("An error occurred while reading settings: {}", err);
                return Err(TickOutcome::AuthFailed(err.into()));
            }
        };

        if !settings.is_configured() {
            tracing::info!("No account configured, skipping data sync");
            return Err(TickOutcome::NotConfigured);
        }

        Ok(settings.refresh_interval.max(1))
    }

    /// Claims the due slot if the interval has elapsed. The next slot is set
    /// before the sync runs, so a failed sync waits a full interval like any other.
    fn claim_due(&self, now: DateTime<Utc>, interval_minutes: u32) -> Result<(), DateTime<Utc>> {
        let mut next = self
            .next_data_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *next {
            Some(next_data_refresh) if now < next_data_refresh => Err(next_data_refresh),
            _ => {
                *next = Some(now + Duration::minutes(interval_minutes.into()));
                Ok(())
            }
        }
    }

    fn reanchor(&self, now: DateTime<Utc>, interval_minutes: u32) {
        let mut next = self
            .next_data_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *next = Some(now + Duration::minutes(interval_minutes.into()));
    }

    async fn run_sync(&self) -> TickOutcome {
        match self.sync.run_sync().await {
            Ok(report) => TickOutcome::Synced(report),
            Err(err) => {
                tracing::warn!("Data sync skipped: {}", err);
                TickOutcome::SyncSkipped(err)
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let interval_minutes = match self.prepare().await {
            Ok(interval_minutes) => interval_minutes,
            Err(outcome) => return outcome,
        };

        let now = self.clock.now();
        if let Err(next_data_refresh) = self.claim_due(now, interval_minutes) {
            return TickOutcome::NotDue { next_data_refresh };
        }

        self.run_sync().await
    }

    /// Out-of-band sync, e.g. right after the configuration changed. Restarts
    /// the periodic schedule from now so the next due check stays coherent.
    pub async fn trigger_now(&self) -> TickOutcome {
        tracing::info!("Running on-demand data sync...");

        let interval_minutes = match self.prepare().await {
            Ok(interval_minutes) => interval_minutes,
            Err(outcome) => return outcome,
        };

        self.reanchor(self.clock.now(), interval_minutes);
        self.run_sync().await
    }

    pub async fn run(self: Arc<Self>) {
        // Create a Tokio interval. The first tick fires immediately.
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            tracing::debug!("Running scheduler tick...");

            match self.tick().await {
                TickOutcome::Synced(report) if report.is_success() => {
                    tracing::info!(
                        "Finished data sync, next due at {:?}",
                        self.next_data_refresh()
                    );
                }
                TickOutcome::Synced(_) => {
                    tracing::warn!(
                        "Data sync had failures, retrying at {:?}",
                        self.next_data_refresh()
                    );
                }
                TickOutcome::NotDue { next_data_refresh } => {
                    tracing::debug!("Data sync not due until {}", next_data_refresh);
                }
                TickOutcome::AuthFailed(err) => {
                    tracing::warn!("Tick skipped, retrying token check next tick: {}", err);
                }
                TickOutcome::SyncSkipped(err) => {
                    tracing::debug!("Tick ended without syncing: {}", err);
                }
                TickOutcome::Unauthenticated | TickOutcome::NotConfigured => {}
            }
        }
    }
}
