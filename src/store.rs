use async_trait::async_trait;
use serde_json::Value;

use crate::{domain::Settings, error::StoreError};

pub const SETTINGS_DATASOURCE: &str = "truelayerSettings";
pub const SETTINGS_KEY: &str = "settings";
pub const BALANCE_STREAM: &str = "truelayerUserBalance";
pub const TRANSACTIONS_STREAM: &str = "truelayerUserTransactions";

/// Whole-document key-value store for the driver settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Settings>, StoreError>;
    async fn write(&self, key: &str, settings: &Settings) -> Result<(), StoreError>;
}

/// Destination for fetched balance and transaction payloads.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, stream_key: &str, payload: &Value) -> Result<(), StoreError>;
}
