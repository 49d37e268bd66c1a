mod args;
mod clock;
mod configuration;
mod credentials;
mod db;
mod domain;
mod error;
mod handlers;
mod jobs;
mod logging;
mod providers;
mod settings;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod truelayer;

use std::{sync::Arc, time::Duration};

use args::parse_args;
use axum::{Router, routing::get};
use clock::{Clock, SystemClock};
use configuration::ConfigurationService;
use credentials::CredentialManager;
use db::{PgResultSink, PgSettingsStore, create_pool, ensure_schema};
use domain::DefaultSettings;
use handlers::{configure, save_configuration, status, truelayer_redirect, ui};
use jobs::Scheduler;
use logging::setup_logging;
use providers::DataProvider;
use settings::SettingsManager;
use sync::DataSync;
use truelayer::TrueLayerClient;

pub struct AppState {
    credentials: Arc<CredentialManager>,
    scheduler: Arc<Scheduler>,
    configuration: Arc<ConfigurationService>,
    settings: Arc<SettingsManager>,
    data_provider: Arc<dyn DataProvider>,
    request_timeout: Duration,
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir, args.log_level).expect("Failed to initialise logging");

    let pool = create_pool(&args.database_url)
        .await
        .expect("Failed to create PostgreSQL pool");
    ensure_schema(&pool)
        .await
        .expect("Failed to create schema and register data sources");

    let request_timeout = Duration::from_secs(args.request_timeout);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let truelayer = Arc::new(
        TrueLayerClient::new(
            &args.auth_url,
            &args.api_url,
            &args.client_id,
            &args.client_secret,
            request_timeout,
        )
        .expect("Failed to build TrueLayer HTTP client"),
    );

    let settings = Arc::new(SettingsManager::new(
        Arc::new(PgSettingsStore::new(pool.clone())),
        DefaultSettings {
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
            redirect_url: args.redirect_url(),
        },
        request_timeout,
    ));
    let credentials = Arc::new(CredentialManager::new(
        settings.clone(),
        truelayer.clone(),
        clock.clone(),
        request_timeout,
    ));
    let sync = Arc::new(DataSync::new(
        settings.clone(),
        truelayer.clone(),
        Arc::new(PgResultSink::new(pool)),
        clock.clone(),
        request_timeout,
        chrono::Duration::days(args.initial_lookback_days),
    ));
    let scheduler = Arc::new(Scheduler::new(
        credentials.clone(),
        sync,
        settings.clone(),
        clock,
    ));

    let app_state = Arc::new(AppState {
        credentials,
        scheduler: scheduler.clone(),
        configuration: Arc::new(ConfigurationService::new(
            settings.clone(),
            scheduler.clone(),
        )),
        settings,
        data_provider: truelayer,
        request_timeout,
    });

    tracing::info!("Spawning scheduler...");
    tokio::spawn(scheduler.run());

    let app = Router::new()
        .route("/ui", get(ui))
        .route("/truelayer-redirect", get(truelayer_redirect))
        .route("/configure", get(configure))
        .route("/saveConfiguration", get(save_configuration))
        .route("/status", get(status))
        .with_state(app_state);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
