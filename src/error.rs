use std::{fmt::Display, future::Future, time::Duration};

/// Failures talking to TrueLayer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from {0}")]
    Empty(String),
}

/// Failures reading or writing the settings store or the result sink.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no tokens stored, authorization required")]
    Unauthenticated,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("failed to persist tokens: {0}")]
    PersistFailed(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no tokens stored, authorization required")]
    Unauthenticated,

    #[error("no account configured")]
    NotConfigured,

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("persist failed: {0}")]
    PersistFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("account id must not be empty")]
    InvalidAccount,

    #[error("refresh interval must be a positive number of minutes, got {0}")]
    InvalidInterval(String),

    #[error("failed to persist configuration: {0}")]
    PersistFailed(#[from] StoreError),
}

/// Runs `future` with an upper bound, flattening both the elapsed case and
/// the inner error into a message.
pub async fn with_timeout<T, E, F>(limit: Duration, what: &str, future: F) -> Result<T, String>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{}: {}", what, err)),
        Err(_) => Err(format!("{}: timed out after {:?}", what, limit)),
    }
}
