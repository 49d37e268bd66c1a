use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Account, Balance, TokenSet, Transaction},
    error::ProviderError,
};

pub const PERMISSION_SCOPES: [&str; 6] = [
    "info",
    "accounts",
    "balance",
    "transactions",
    "offline_access",
    "cards",
];

/// OAuth2 side of the data provider. Returned token sets carry no expiry;
/// callers stamp their own.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn build_authorization_url(&self, redirect_url: &str, scopes: &[&str], nonce: &str) -> String;

    async fn exchange_code_for_token(
        &self,
        redirect_url: &str,
        code: &str,
    ) -> Result<TokenSet, ProviderError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_accounts(&self, access_token: &str) -> Result<Vec<Account>, ProviderError>;

    async fn get_balance(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Balance, ProviderError>;

    async fn get_transactions(
        &self,
        access_token: &str,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError>;
}
