//! Sample extension: greets players and keeps a running tally.
//!
//! Build it as a `cdylib` and drop the library into the host's extension
//! directory.

use bulwark_api::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Published as `extension:greeter:started` once the commands are in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeterStartedEvent {
    pub version: String,
    pub total_greetings: u64,
    pub timestamp: u64,
}

pub struct GreeterExtension {
    greetings: Arc<AtomicU64>,
}

impl GreeterExtension {
    pub fn new() -> Self {
        Self {
            greetings: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for GreeterExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for GreeterExtension {
    fn name(&self) -> &str {
        "greeter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn default_translations(&self) -> Translations {
        Translations::new()
            .with("greeting", "Welcome, {0}!")
            .with("tally", "{0} greeting(s) so far")
    }

    fn default_configuration(&self) -> Configuration {
        Configuration::new()
            .with("default_name", "traveller")
            .with("greet_cooldown", 5)
            .with("total_greetings", 0)
    }

    async fn load(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
        let configuration = context.configuration();
        let translations = context.translations();

        let total: u64 = configuration.get("total_greetings").unwrap_or(0);
        self.greetings.store(total, Ordering::Relaxed);
        let cooldown: i32 = configuration.get("greet_cooldown").unwrap_or(5);
        let default_name: String = configuration
            .get("default_name")
            .unwrap_or_else(|| "traveller".to_string());

        let greetings = self.greetings.clone();
        let greeting = translations.clone();
        context.register_command(
            CommandDefinition::new(["greet", "hello"], move |inv| {
                let name = inv.arg(0).unwrap_or(default_name.as_str());
                greetings.fetch_add(1, Ordering::Relaxed);
                inv.reply(greeting.translate("greeting", &[name]));
                Ok(())
            })
            .permission("greeter.greet")
            .cooldown(cooldown)
            .help("Greets someone")
            .usage("/greet [name]"),
        )?;

        let greetings = self.greetings.clone();
        context.register_command(
            CommandDefinition::new(["greetings"], move |inv| {
                let count = greetings.load(Ordering::Relaxed).to_string();
                inv.reply(translations.translate("tally", &[count.as_str()]));
                Ok(())
            })
            .permission("greeter.tally")
            .help("Shows how many greetings were given"),
        )?;

        context
            .events()
            .emit_extension(
                "greeter",
                "started",
                &GreeterStartedEvent {
                    version: self.version().to_string(),
                    total_greetings: total,
                    timestamp: current_timestamp(),
                },
            )
            .await
            .map_err(|e| ExtensionError::InitializationFailed(e.to_string()))?;

        context.log(
            LogLevel::Info,
            &format!("Greeter ready with {} greeting(s) on record", total),
        );
        Ok(())
    }

    async fn unload(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
        let total = self.greetings.load(Ordering::Relaxed);
        context.set_configuration("total_greetings", serde_json::json!(total));
        context.log(LogLevel::Info, "Greeter stopped");
        Ok(())
    }
}

create_extension!(GreeterExtension);
