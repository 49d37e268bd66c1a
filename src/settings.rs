use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    domain::{DefaultSettings, Settings},
    error::{StoreError, with_timeout},
    store::{SETTINGS_KEY, SettingsStore},
};

/// Gatekeeper for the settings record. Every mutation goes through
/// [`SettingsManager::update`], which holds a lock across the read and the
/// write so concurrent writers never interleave at the field level.
pub struct SettingsManager {
    store: Arc<dyn SettingsStore>,
    defaults: DefaultSettings,
    lock: Mutex<()>,
    timeout: Duration,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: DefaultSettings, timeout: Duration) -> Self {
        SettingsManager {
            store,
            defaults,
            lock: Mutex::new(()),
            timeout,
        }
    }

    /// Current settings, or a fresh default record if nothing has been stored yet.
    /// A failed read is an error rather than a fallback to defaults, otherwise a
    /// later write could replace stored tokens with an empty record.
    pub async fn get(&self) -> Result<Settings, StoreError> {
        let stored = with_timeout(self.timeout, "read settings", self.store.read(SETTINGS_KEY))
            .await
            .map_err(StoreError::Unavailable)
            .inspect_err(|err| tracing::error!("Error reading settings: {}", err))?;

        match stored {
            Some(settings) => Ok(settings),
            None => {
                tracing::info!("No stored settings found, using defaults");
                Ok(Settings::from_defaults(&self.defaults))
            }
        }
    }

    /// Read-modify-write of the whole record. `apply` runs on an owned copy; the
    /// updated record is written back in full and returned.
    pub async fn update<F>(&self, apply: F) -> Result<Settings, StoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.lock.lock().await;

        let mut settings = self.get().await?;
        apply(&mut settings);

        with_timeout(
            self.timeout,
            "write settings",
            self.store.write(SETTINGS_KEY, &settings),
        )
        .await
        .map_err(StoreError::Unavailable)
        .inspect_err(|err| tracing::error!("Error writing settings: {}", err))?;

        tracing::debug!("Settings saved");
        Ok(settings)
    }
}
