//! `bulwark.toml` loading and validation.

use bulwark_api::ServerState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub host: HostSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Root of the persisted JSON documents.
    pub data_directory: String,
    pub extension_directory: String,
    /// Support libraries, loaded before any extension.
    pub library_directory: String,
    /// Keep starting later services after one fails to load.
    #[serde(default = "default_true")]
    pub services_continue_on_error: bool,
    #[serde(default = "default_server_state")]
    pub server_state: ServerState,
}

fn default_true() -> bool {
    true
}

fn default_server_state() -> ServerState {
    ServerState::Multiplayer
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostSettings {
                data_directory: "data".to_string(),
                extension_directory: "extensions".to_string(),
                library_directory: "libraries".to_string(),
                services_continue_on_error: true,
                server_state: ServerState::Multiplayer,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads the configuration, writing a default file first if none exists.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let directories = [
            ("data_directory", &self.host.data_directory),
            ("extension_directory", &self.host.extension_directory),
            ("library_directory", &self.host.library_directory),
        ];
        for (key, value) in directories {
            if value.trim().is_empty() {
                return Err(format!("{key} cannot be empty"));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn data_directory(&self) -> PathBuf {
        PathBuf::from(&self.host.data_directory)
    }

    pub fn extension_directory(&self) -> PathBuf {
        PathBuf::from(&self.host.extension_directory)
    }

    pub fn library_directory(&self) -> PathBuf {
        PathBuf::from(&self.host.library_directory)
    }
}
