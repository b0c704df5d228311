use crate::context::HostServices;
use crate::error::HostError;
use crate::persistence::COMMANDS_NAMESPACE;
use crate::service::InternalService;
use async_trait::async_trait;
use bulwark_commands::CommandSettings;
use std::collections::BTreeMap;
use tracing::info;

pub const COMMAND_MANAGER_LAUNCH_INDEX: u32 = 2;

/// Persists operator overrides of command aliases, permissions, cooldowns
/// and enablement in the `Commands` document.
#[derive(Debug, Default)]
pub struct CommandManager;

impl CommandManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InternalService for CommandManager {
    fn name(&self) -> &str {
        "CommandManager"
    }

    fn launch_index(&self) -> u32 {
        COMMAND_MANAGER_LAUNCH_INDEX
    }

    async fn load(&mut self, services: &HostServices) -> Result<(), HostError> {
        let (document, created) = services.store.load(COMMANDS_NAMESPACE)?;
        if created {
            services.store.save(COMMANDS_NAMESPACE, &document)?;
            return Ok(());
        }

        let overrides: BTreeMap<String, CommandSettings> = serde_json::from_value(document)
            .map_err(|e| HostError::MalformedDocument {
                namespace: COMMANDS_NAMESPACE.to_string(),
                reason: e.to_string(),
            })?;
        info!("Loaded {} command overrides", overrides.len());
        services.commands.load_overrides(overrides);
        Ok(())
    }

    async fn unload(&mut self, services: &HostServices) -> Result<(), HostError> {
        let document = serde_json::to_value(services.commands.settings_document()).map_err(|e| {
            HostError::MalformedDocument {
                namespace: COMMANDS_NAMESPACE.to_string(),
                reason: e.to_string(),
            }
        })?;
        services.store.save(COMMANDS_NAMESPACE, &document)?;
        Ok(())
    }
}
