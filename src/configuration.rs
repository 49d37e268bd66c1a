use std::sync::Arc;

use crate::{
    error::ConfigError,
    jobs::{Scheduler, TickOutcome},
    settings::SettingsManager,
};

/// Applies operator changes to the account selection and refresh interval.
pub struct ConfigurationService {
    settings: Arc<SettingsManager>,
    scheduler: Arc<Scheduler>,
}

impl ConfigurationService {
    pub fn new(settings: Arc<SettingsManager>, scheduler: Arc<Scheduler>) -> Self {
        ConfigurationService {
            settings,
            scheduler,
        }
    }

    /// Stores the new selection and immediately runs one on-demand sync. Sync
    /// failures are reported in the outcome, they do not undo the save.
    pub async fn save_configuration(
        &self,
        account_id: &str,
        refresh_interval: u32,
    ) -> Result<TickOutcome, ConfigError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(ConfigError::InvalidAccount);
        }
        if refresh_interval == 0 {
            return Err(ConfigError::InvalidInterval(refresh_interval.to_string()));
        }

        tracing::info!(
            "Saving configuration account_id={} refresh_interval={}",
            account_id,
            refresh_interval
        );

        self.settings
            .update(|settings| {
                settings.account_id = Some(account_id.to_string());
                settings.refresh_interval = refresh_interval;
            })
            .await?;

        Ok(self.scheduler.trigger_now().await)
    }
}
