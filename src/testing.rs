//! In-memory fakes for the external collaborators, shared by the unit tests.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::{
    clock::Clock,
    credentials::CredentialManager,
    domain::{Account, Balance, DefaultSettings, Settings, TokenSet, Transaction, TransactionWindow},
    error::{ProviderError, StoreError},
    jobs::Scheduler,
    providers::{AuthProvider, DataProvider},
    settings::SettingsManager,
    store::{ResultSink, SettingsStore},
    sync::DataSync,
};

pub fn default_settings() -> DefaultSettings {
    DefaultSettings {
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
        redirect_url: "https://driver.local/truelayer-redirect".to_string(),
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn tokens(access: &str, refresh: &str, expiration_date: Option<DateTime<Utc>>) -> TokenSet {
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expiration_date,
    }
}

/// Settings with a token valid for another ten minutes and an account selected.
pub fn configured_settings(now: DateTime<Utc>) -> Settings {
    let mut settings = Settings::from_defaults(&default_settings());
    settings.tokens = Some(tokens("A1", "R1", Some(now + Duration::minutes(10))));
    settings.account_id = Some("acct-42".to_string());
    settings
}

pub fn transaction(id: &str, timestamp: DateTime<Utc>) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        timestamp,
        amount: -4.2,
        currency: "GBP".to_string(),
        description: format!("purchase {}", id),
        extra: Map::new(),
    }
}

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FakeClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    record: Mutex<Option<Settings>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySettingsStore {
    pub fn with(settings: Settings) -> Self {
        let store = MemorySettingsStore::default();
        store.set(settings);
        store
    }

    pub fn set(&self, settings: Settings) {
        *self.record.lock().unwrap() = Some(settings);
    }

    pub fn current(&self) -> Option<Settings> {
        self.record.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn read(&self, _key: &str) -> Result<Option<Settings>, StoreError> {
        tokio::task::yield_now().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read refused".to_string()));
        }
        Ok(self.current())
    }

    async fn write(&self, _key: &str, settings: &Settings) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write refused".to_string()));
        }
        self.set(settings.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, Value)>>,
    failing: Mutex<HashSet<String>>,
}

impl MemorySink {
    pub fn fail_stream(&self, stream_key: &str) {
        self.failing.lock().unwrap().insert(stream_key.to_string());
    }

    pub fn records_for(&self, stream_key: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == stream_key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write(&self, stream_key: &str, payload: &Value) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(stream_key) {
            return Err(StoreError::Unavailable(format!("{} refused", stream_key)));
        }
        self.records
            .lock()
            .unwrap()
            .push((stream_key.to_string(), payload.clone()));
        Ok(())
    }
}

/// Auth provider that hands out `next_tokens` on refresh. When `hold_refresh`
/// is set, each refresh signals `refresh_started` and then waits for
/// `release_refresh` before answering.
pub struct FakeAuthProvider {
    pub next_tokens: Mutex<TokenSet>,
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refreshed_with: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub hold_refresh: AtomicBool,
    pub refresh_started: Arc<Notify>,
    pub release_refresh: Arc<Notify>,
}

impl FakeAuthProvider {
    pub fn new(next_tokens: TokenSet) -> Self {
        FakeAuthProvider {
            next_tokens: Mutex::new(next_tokens),
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refreshed_with: Mutex::new(vec![]),
            fail: AtomicBool::new(false),
            hold_refresh: AtomicBool::new(false),
            refresh_started: Arc::new(Notify::new()),
            release_refresh: Arc::new(Notify::new()),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> Result<TokenSet, ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 401,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(self.next_tokens.lock().unwrap().clone())
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    fn build_authorization_url(&self, redirect_url: &str, scopes: &[&str], nonce: &str) -> String {
        format!(
            "https://auth.test/?redirect_uri={}&scope={}&nonce={}",
            redirect_url,
            scopes.join("+"),
            nonce
        )
    }

    async fn exchange_code_for_token(
        &self,
        _redirect_url: &str,
        _code: &str,
    ) -> Result<TokenSet, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.issue()
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.refresh_started.notify_one();
            self.release_refresh.notified().await;
        }
        self.issue()
    }
}

pub struct FakeDataProvider {
    pub balance: Mutex<Balance>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub accounts: Vec<Account>,
    pub balance_calls: AtomicUsize,
    pub windows: Mutex<Vec<TransactionWindow>>,
    pub access_tokens: Mutex<Vec<String>>,
    pub fail_balance: AtomicBool,
    pub fail_transactions: AtomicBool,
    /// Transaction fetches never answer while set.
    pub hang_transactions: AtomicBool,
}

impl Default for FakeDataProvider {
    fn default() -> Self {
        FakeDataProvider {
            balance: Mutex::new(Balance {
                currency: "GBP".to_string(),
                available: 250.0,
                current: 200.0,
                extra: Map::new(),
            }),
            transactions: Mutex::new(vec![]),
            accounts: vec![Account {
                account_id: "acct-42".to_string(),
                account_type: "TRANSACTION".to_string(),
                display_name: "Current Account".to_string(),
                extra: Map::new(),
            }],
            balance_calls: AtomicUsize::new(0),
            windows: Mutex::new(vec![]),
            access_tokens: Mutex::new(vec![]),
            fail_balance: AtomicBool::new(false),
            fail_transactions: AtomicBool::new(false),
            hang_transactions: AtomicBool::new(false),
        }
    }
}

impl FakeDataProvider {
    pub fn windows(&self) -> Vec<TransactionWindow> {
        self.windows.lock().unwrap().clone()
    }

    pub fn set_transactions(&self, transactions: Vec<Transaction>) {
        *self.transactions.lock().unwrap() = transactions;
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for FakeDataProvider {
    async fn get_accounts(&self, _access_token: &str) -> Result<Vec<Account>, ProviderError> {
        Ok(self.accounts.clone())
    }

    async fn get_balance(
        &self,
        access_token: &str,
        _account_id: &str,
    ) -> Result<Balance, ProviderError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.access_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn get_transactions(
        &self,
        _access_token: &str,
        _account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        self.windows
            .lock()
            .unwrap()
            .push(TransactionWindow { from, to });
        if self.hang_transactions.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.transactions.lock().unwrap().clone())
    }
}

/// Fully wired core over the fakes above.
pub struct Harness {
    pub store: Arc<MemorySettingsStore>,
    pub auth: Arc<FakeAuthProvider>,
    pub provider: Arc<FakeDataProvider>,
    pub sink: Arc<MemorySink>,
    pub clock: Arc<FakeClock>,
    pub settings: Arc<SettingsManager>,
    pub credentials: Arc<CredentialManager>,
    pub scheduler: Arc<Scheduler>,
}

impl Harness {
    pub fn new(initial: Option<Settings>) -> Self {
        let store = Arc::new(match initial {
            Some(settings) => MemorySettingsStore::with(settings),
            None => MemorySettingsStore::default(),
        });
        let auth = Arc::new(FakeAuthProvider::new(tokens("A2", "R2", None)));
        let provider = Arc::new(FakeDataProvider::default());
        let sink = Arc::new(MemorySink::default());
        let clock = Arc::new(FakeClock::new(t0()));
        let timeout = std::time::Duration::from_secs(1);

        let settings = Arc::new(SettingsManager::new(
            store.clone(),
            default_settings(),
            timeout,
        ));
        let credentials = Arc::new(CredentialManager::new(
            settings.clone(),
            auth.clone(),
            clock.clone(),
            timeout,
        ));
        let sync = Arc::new(DataSync::new(
            settings.clone(),
            provider.clone(),
            sink.clone(),
            clock.clone(),
            timeout,
            Duration::days(90),
        ));
        let scheduler = Arc::new(Scheduler::new(
            credentials.clone(),
            sync,
            settings.clone(),
            clock.clone(),
        ));

        Harness {
            store,
            auth,
            provider,
            sink,
            clock,
            settings,
            credentials,
            scheduler,
        }
    }
}
