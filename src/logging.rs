use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    fmt::{
        self,
        format::{Format, Full},
        time::SystemTime,
    },
    prelude::*,
    util::TryInitError,
};

const LOG_FILE_NAME: &str = "truelayer-driver.log";
const STRUCTURED_LOG_SUBDIR: &str = "structured";

fn driver_log_format() -> Format<Full, SystemTime> {
    fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_file(true)
        .with_target(true)
        .with_thread_names(true)
}

/// `driver_level` applies to this crate only. HTTP and database internals are
/// capped at INFO, TLS chatter at WARN.
fn build_filter(driver_level: Level) -> Targets {
    Targets::new()
        .with_target("truelayer_driver", driver_level)
        .with_target("sqlx", Level::INFO)
        .with_target("hyper_util", Level::INFO)
        .with_target("reqwest", Level::INFO)
        .with_target("rustls", Level::WARN)
        .with_default(Level::INFO)
}

fn structured_log_dir(base_log_dir: &str) -> String {
    format!(
        "{}/{}",
        base_log_dir.trim_end_matches('/'),
        STRUCTURED_LOG_SUBDIR
    )
}

/// Installs the global subscriber: coloured stdout always, plus daily-rolling
/// plain and JSON files when `base_log_dir` is set.
pub fn setup_logging(base_log_dir: &str, driver_level: Level) -> Result<(), TryInitError> {
    let stdout_layer = fmt::layer().event_format(driver_log_format().with_ansi(true));
    let registry = tracing_subscriber::registry()
        .with(build_filter(driver_level))
        .with(stdout_layer);

    if base_log_dir.is_empty() {
        return registry.try_init();
    }

    let text_layer = fmt::layer()
        .event_format(driver_log_format())
        .with_writer(tracing_appender::rolling::daily(base_log_dir, LOG_FILE_NAME));
    let json_layer = fmt::layer()
        .event_format(driver_log_format().json())
        .with_writer(tracing_appender::rolling::daily(
            structured_log_dir(base_log_dir),
            LOG_FILE_NAME,
        ));
    registry.with(text_layer).with(json_layer).try_init()
}
