//! Extension manager settings, persisted in the `ExtensionManager` document.

use crate::error::HostError;
use crate::persistence::{DocumentStore, EXTENSION_MANAGER_NAMESPACE};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExtensionSettings {
    /// Stored for operators; update fetching is not performed by the host.
    pub auto_update: bool,
    /// Keep loading further extensions after one fails.
    pub continue_on_error: bool,
    pub notify_updates: bool,
    pub check_update_time_seconds: u64,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            auto_update: false,
            continue_on_error: true,
            notify_updates: true,
            check_update_time_seconds: 1800,
        }
    }
}

impl ExtensionSettings {
    /// Reads the settings document, writing defaults on first run and
    /// filling in any key the stored document lacks.
    pub fn load(store: &dyn DocumentStore) -> Result<Self, HostError> {
        let (document, created) = store.load(EXTENSION_MANAGER_NAMESPACE)?;
        let settings: ExtensionSettings =
            serde_json::from_value(document.clone()).map_err(|e| HostError::MalformedDocument {
                namespace: EXTENSION_MANAGER_NAMESPACE.to_string(),
                reason: e.to_string(),
            })?;

        let complete = settings.to_document();
        if created || !covers(&document, &complete) {
            if !created {
                info!("Adding missing keys to {}", EXTENSION_MANAGER_NAMESPACE);
            }
            store.save(EXTENSION_MANAGER_NAMESPACE, &complete)?;
        }
        Ok(settings)
    }

    pub fn save(&self, store: &dyn DocumentStore) -> Result<(), HostError> {
        store.save(EXTENSION_MANAGER_NAMESPACE, &self.to_document())?;
        Ok(())
    }

    fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn covers(document: &serde_json::Value, complete: &serde_json::Value) -> bool {
    match (document.as_object(), complete.as_object()) {
        (Some(stored), Some(wanted)) => wanted.keys().all(|key| stored.contains_key(key)),
        _ => false,
    }
}
