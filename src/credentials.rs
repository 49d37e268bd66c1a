use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::{AuthStatus, TokenSet},
    error::{AuthError, with_timeout},
    providers::{AuthProvider, PERMISSION_SCOPES},
    settings::SettingsManager,
};

/// Minutes a freshly issued access token is trusted for. The provider's own
/// `expires_in` is ignored.
pub const TOKEN_REFRESH_LEAD_MINUTES: i64 = 30;

fn token_expiry(issued_at: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    issued_at + chrono::Duration::minutes(TOKEN_REFRESH_LEAD_MINUTES)
}

pub struct CredentialManager {
    settings: Arc<SettingsManager>,
    provider: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    // Serializes refresh decisions so concurrent callers trigger at most one
    // upstream refresh. Unlike the settings lock it is held across the refresh
    // and code-exchange calls, so token checks from /configure and scheduler
    // ticks can wait up to `timeout` behind an in-flight refresh.
    refresh_gate: Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        settings: Arc<SettingsManager>,
        provider: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        CredentialManager {
            settings,
            provider,
            clock,
            timeout,
            refresh_gate: Mutex::new(()),
        }
    }

    /// Makes sure the stored access token is usable, refreshing it if it has
    /// expired. On refresh failure nothing is written and the stale token stays
    /// in place for the next attempt.
    pub async fn ensure_valid_token(&self) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let settings = self.settings.get().await?;
        let tokens = settings.tokens.ok_or(AuthError::Unauthenticated)?;

        let now = self.clock.now();
        if !tokens.is_expired(now) {
            tracing::debug!("Access token valid until {:?}", tokens.expiration_date);
            return Ok(());
        }

        tracing::info!(
            "Access token expired at {:?}, refreshing...",
            tokens.expiration_date
        );

        let refreshed = with_timeout(
            self.timeout,
            "refresh access token",
            self.provider.refresh_access_token(&tokens.refresh_token),
        )
        .await
        .map_err(AuthError::RefreshFailed)
        .inspect_err(|err| tracing::error!("{}", err))?;

        let expiration_date = token_expiry(now);
        self.settings
            .update(|settings| {
                settings.tokens = Some(TokenSet {
                    expiration_date: Some(expiration_date),
                    ..refreshed
                });
            })
            .await?;

        tracing::info!("Access token refreshed, next refresh due at {}", expiration_date);
        Ok(())
    }

    pub async fn authorization_url(&self) -> Result<String, AuthError> {
        let settings = self.settings.get().await?;
        let nonce = Uuid::new_v4().to_string();

        Ok(self
            .provider
            .build_authorization_url(&settings.redirect_url, &PERMISSION_SCOPES, &nonce))
    }

    /// Exchanges the code from the OAuth redirect and stores the resulting tokens.
    pub async fn complete_authorization(&self, code: &str) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let settings = self.settings.get().await?;

        let issued = with_timeout(
            self.timeout,
            "exchange authorisation code",
            self.provider
                .exchange_code_for_token(&settings.redirect_url, code),
        )
        .await
        .map_err(AuthError::ExchangeFailed)
        .inspect_err(|err| tracing::error!("{}", err))?;

        let expiration_date = token_expiry(self.clock.now());
        self.settings
            .update(|settings| {
                // A first authorization starts a fresh cursor; re-authorizing keeps it.
                if settings.tokens.is_none() {
                    settings.retrieve_from = None;
                }
                settings.tokens = Some(TokenSet {
                    expiration_date: Some(expiration_date),
                    ..issued
                });
            })
            .await?;

        tracing::info!("Authorisation completed, tokens valid until {}", expiration_date);
        Ok(())
    }

    pub async fn status(&self) -> Result<AuthStatus, AuthError> {
        let settings = self.settings.get().await?;

        Ok(match settings.tokens {
            None => AuthStatus::Unauthenticated,
            Some(tokens) => match tokens.expiration_date {
                Some(expires_at) if !tokens.is_expired(self.clock.now()) => {
                    AuthStatus::Valid { expires_at }
                }
                expired_at => AuthStatus::Expired { expired_at },
            },
        })
    }
}
