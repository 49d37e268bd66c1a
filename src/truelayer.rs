use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use url::form_urlencoded;

use crate::{
    domain::{Account, Balance, TokenSet, Transaction},
    error::ProviderError,
    providers::{AuthProvider, DataProvider},
};

pub const DEFAULT_AUTH_URL: &str = "https://auth.truelayer.com";
pub const DEFAULT_API_URL: &str = "https://api.truelayer.com";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u32>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        // expires_in is dropped, callers stamp their own expiry.
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiration_date: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultsResponse<T> {
    results: Vec<T>,
}

pub struct TrueLayerClient {
    client: reqwest::Client,
    auth_url: String,
    api_url: String,
    client_id: String,
    client_secret: String,
}

impl TrueLayerClient {
    pub fn new(
        auth_url: &str,
        api_url: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(TrueLayerClient {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    async fn request_token(&self, params: HashMap<&str, &str>) -> Result<TokenSet, ProviderError> {
        let res = self
            .client
            .post(format!("{}/connect/token", self.auth_url))
            .form(&params)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!("Error occurred in request to TrueLayer token API: {:#?}", err)
            })?;

        let token_response = check_status(res)
            .await?
            .json::<TokenResponse>()
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred while deserialising token response: {:#?}",
                    err
                )
            })?;

        tracing::info!(
            "Received token_type={:?} expires_in={:?}",
            &token_response.token_type,
            &token_response.expires_in
        );

        Ok(token_response.into())
    }

    async fn get_results<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        let res = self
            .client
            .get(format!("{}/data/v1{}", self.api_url, path))
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred in request to TrueLayer data API path={}: {:#?}",
                    path,
                    err
                )
            })?;

        tracing::debug!("Returned code: {} for path={}", res.status(), path);

        check_status(res)
            .await?
            .json::<ResultsResponse<T>>()
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred while deserialising response for path={}: {:#?}",
                    path,
                    err
                )
            })
            .map(|res| res.results)
            .map_err(ProviderError::from)
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    tracing::error!("TrueLayer returned status={} body={}", status, &body);
    Err(ProviderError::Status { status, body })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl AuthProvider for TrueLayerClient {
    fn build_authorization_url(&self, redirect_url: &str, scopes: &[&str], nonce: &str) -> String {
        form_urlencoded::Serializer::new(format!("{}/?", self.auth_url))
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_url)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("nonce", nonce)
            .finish()
    }

    async fn exchange_code_for_token(
        &self,
        redirect_url: &str,
        code: &str,
    ) -> Result<TokenSet, ProviderError> {
        tracing::info!("Exchanging authorisation code for tokens");

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("redirect_uri", redirect_url);
        params.insert("code", code);

        self.request_token(params).await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        tracing::info!("Refreshing access token");

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("refresh_token", refresh_token);

        self.request_token(params).await
    }
}

#[async_trait]
impl DataProvider for TrueLayerClient {
    async fn get_accounts(&self, access_token: &str) -> Result<Vec<Account>, ProviderError> {
        tracing::info!("Listing accounts...");
        self.get_results(access_token, "/accounts", &[]).await
    }

    async fn get_balance(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<Balance, ProviderError> {
        tracing::info!("Fetching balance for account_id={}", account_id);
        let path = format!("/accounts/{}/balance", account_id);
        let balances = self.get_results::<Balance>(access_token, &path, &[]).await?;
        balances.into_iter().next().ok_or(ProviderError::Empty(path))
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        tracing::info!(
            "Listing transactions for account_id={} from={} to={}",
            account_id,
            from,
            to
        );
        let path = format!("/accounts/{}/transactions", account_id);
        self.get_results(
            access_token,
            &path,
            &[("from", format_timestamp(from)), ("to", format_timestamp(to))],
        )
        .await
    }
}
