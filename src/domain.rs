use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u32 = 30;

/// Values a brand new settings record starts from. Built once at startup and
/// copied into every fresh [`Settings`], never handed out by reference.
#[derive(Debug, Clone)]
pub struct DefaultSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// An unknown expiry counts as expired so the first check always refreshes.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_date {
            Some(expiration_date) => now >= expiration_date,
            None => true,
        }
    }
}

/// The single persisted record holding credentials, account selection and the
/// transaction cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    #[serde(default)]
    pub tokens: Option<TokenSet>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u32,
    #[serde(default)]
    pub retrieve_from: Option<DateTime<Utc>>,
}

fn default_refresh_interval() -> u32 {
    DEFAULT_REFRESH_INTERVAL_MINUTES
}

impl Settings {
    pub fn from_defaults(defaults: &DefaultSettings) -> Self {
        Settings {
            client_id: defaults.client_id.clone(),
            client_secret: defaults.client_secret.clone(),
            redirect_url: defaults.redirect_url.clone(),
            tokens: None,
            account_id: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_MINUTES,
            retrieve_from: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.tokens.is_some() && self.account_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub available: f64,
    pub current: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Half-open `[from, to)` range of a transaction fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthStatus {
    Unauthenticated,
    Expired { expired_at: Option<DateTime<Utc>> },
    Valid { expires_at: DateTime<Utc> },
}
