use std::sync::Arc;

use crate::{
    AppState,
    domain::AuthStatus,
    error::{AuthError, ConfigError, StoreError, with_timeout},
    jobs::TickOutcome,
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveConfigurationParams {
    pub account: Option<String>,
    pub refresh_interval: Option<String>,
}

#[derive(Debug)]
pub enum AppError {
    Unauthenticated,
    Upstream(String),
    Store(StoreError),
    BadRequest(String),
    /// Configuration could not be saved; reported to the operator as a bad request.
    SaveFailed(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => AppError::Unauthenticated,
            AuthError::PersistFailed(err) => AppError::Store(err),
            AuthError::RefreshFailed(msg) | AuthError::ExchangeFailed(msg) => {
                AppError::Upstream(msg)
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::PersistFailed(err) => AppError::SaveFailed(err),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authorisation required, visit /ui".to_string(),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream request failed: {}", &msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "TrueLayer request failed".to_string(),
                )
            }
            AppError::Store(err) => {
                tracing::error!("Store error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Settings store error".to_string(),
                )
            }
            AppError::BadRequest(msg) => {
                tracing::info!("Bad request: {}", &msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::SaveFailed(err) => {
                tracing::error!("Failed to save configuration: {}", err);
                (
                    StatusCode::BAD_REQUEST,
                    "Configuration could not be saved".to_string(),
                )
            }
        };

        (
            status,
            Json(serde_json::json!({ "statusCode": status.as_u16(), "message": error_message })),
        )
            .into_response()
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Step 1: send the operator to TrueLayer to authorise the driver.
pub async fn ui(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let auth_url = state.credentials.authorization_url().await?;

    Ok(Html(format!(
        r#"<h1>TrueLayer Driver Authentication</h1>
<form action="{}" method="get"><button>Authorise</button></form>
<p><a href="{}">Continue to TrueLayer</a></p>"#,
        escape_html(&auth_url),
        escape_html(&auth_url)
    )))
}

/// Step 2: exchange the code TrueLayer redirected back with.
pub async fn truelayer_redirect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    if let Some(error) = params.error {
        return Err(AppError::BadRequest(format!("Authorisation denied: {}", error)));
    }

    let code = params.code.ok_or(AppError::BadRequest(String::from(
        "No authorisation code received",
    )))?;

    if code.is_empty() {
        return Err(AppError::BadRequest(String::from(
            "Empty authorisation code received",
        )));
    }

    state.credentials.complete_authorization(&code).await?;

    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        scheduler.trigger_now().await;
    });

    tracing::info!("Redirecting to /configure");
    Ok(Redirect::to("/configure"))
}

/// Step 3: pick the account to monitor and the refresh interval.
pub async fn configure(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    state.credentials.ensure_valid_token().await?;

    let settings = state.settings.get().await?;
    let tokens = settings.tokens.ok_or(AppError::Unauthenticated)?;

    let accounts = with_timeout(
        state.request_timeout,
        "list accounts",
        state.data_provider.get_accounts(&tokens.access_token),
    )
    .await
    .map_err(AppError::Upstream)?;

    tracing::info!("Found accounts: {}", accounts.len());

    let mut page = String::from(
        "<h1>TrueLayer Driver Configuration</h1>\
         <p>Please choose the account you want to monitor and its refresh interval:</p>\
         <form action=\"/saveConfiguration\">Accounts:<br>",
    );
    for account in accounts.iter() {
        let checked = if settings.account_id.as_deref() == Some(account.account_id.as_str()) {
            " checked"
        } else {
            ""
        };
        page.push_str(&format!(
            "<input type=\"radio\" name=\"account\" value=\"{}\"{}> {} (<i>{}</i>)<br><br>",
            escape_html(&account.account_id),
            checked,
            escape_html(&account.display_name),
            escape_html(&account.account_type)
        ));
    }
    page.push_str(&format!(
        "Refresh Interval (minutes): <input type=\"text\" name=\"refresh_interval\" value=\"{}\"><br><br>\
         <button>Save Configuration</button></form>",
        settings.refresh_interval
    ));

    Ok(Html(page))
}

/// Step 4: persist the choice and sync straight away.
pub async fn save_configuration(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SaveConfigurationParams>,
) -> Result<Html<String>, AppError> {
    let account = params.account.unwrap_or_default();
    let refresh_interval = params.refresh_interval.unwrap_or_default();
    let refresh_interval: u32 = refresh_interval
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidInterval(refresh_interval.clone()))?;

    let outcome = state
        .configuration
        .save_configuration(&account, refresh_interval)
        .await?;

    let message = match outcome {
        TickOutcome::Synced(report) if report.is_success() => "Data synced.",
        TickOutcome::Synced(_) => "Data sync had errors, it will be retried.",
        TickOutcome::Unauthenticated => "Authorisation required before data can sync.",
        _ => "Data sync will run on the next scheduled tick.",
    };

    Ok(Html(format!(
        "<h1>Configuration saved</h1><p>Monitoring account {} every {} minutes. {}</p>",
        escape_html(account.trim()),
        refresh_interval,
        message
    )))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let auth = state.credentials.status().await?;
    let settings = state.settings.get().await?;
    let authenticated = !matches!(auth, AuthStatus::Unauthenticated);

    Ok(Json(serde_json::json!({
        "status": "active",
        "auth": auth,
        "authenticated": authenticated,
        "configured": settings.is_configured(),
        "account_id": settings.account_id,
        "refresh_interval": settings.refresh_interval,
        "retrieve_from": settings.retrieve_from,
        "next_data_refresh": state.scheduler.next_data_refresh(),
    })))
}
