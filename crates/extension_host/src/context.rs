//! Shared host state and the per-extension view of it.

use crate::persistence::DocumentStore;
use bulwark_api::{
    CommandDefinition, CommandRegistry, Configuration, EventSystem, ExtensionError, GroupStore,
    HostContext, LogLevel, Translations,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Handles to everything the host shares between services and extensions.
#[derive(Clone)]
pub struct HostServices {
    pub events: Arc<EventSystem>,
    pub groups: Arc<GroupStore>,
    pub commands: Arc<CommandRegistry>,
    pub store: Arc<dyn DocumentStore>,
}

impl HostServices {
    /// Fresh services around `store`, with an empty group graph.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let groups = Arc::new(GroupStore::default());
        Self {
            events: Arc::new(EventSystem::new()),
            commands: Arc::new(CommandRegistry::new(groups.clone())),
            groups,
            store,
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

/// [`HostContext`] handed to one extension.
pub struct ExtensionContext {
    extension: String,
    services: HostServices,
    translations: Arc<RwLock<Translations>>,
    configuration: Arc<RwLock<Configuration>>,
}

impl ExtensionContext {
    pub fn new(
        extension: impl Into<String>,
        services: HostServices,
        translations: Arc<RwLock<Translations>>,
        configuration: Arc<RwLock<Configuration>>,
    ) -> Self {
        Self {
            extension: extension.into(),
            services,
            translations,
            configuration,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl HostContext for ExtensionContext {
    fn events(&self) -> Arc<EventSystem> {
        self.services.events.clone()
    }

    fn commands(&self) -> Arc<CommandRegistry> {
        self.services.commands.clone()
    }

    fn groups(&self) -> Arc<GroupStore> {
        self.services.groups.clone()
    }

    fn log(&self, level: LogLevel, message: &str) {
        let extension = self.extension.as_str();
        match level {
            LogLevel::Error => error!(extension, "{}", message),
            LogLevel::Important => info!(extension, important = true, "{}", message),
            LogLevel::Warn => warn!(extension, "{}", message),
            LogLevel::Info => info!(extension, "{}", message),
            LogLevel::Debug => debug!(extension, "{}", message),
            LogLevel::Trace => trace!(extension, "{}", message),
        }
    }

    fn translations(&self) -> Translations {
        self.translations.read().clone()
    }

    fn configuration(&self) -> Configuration {
        self.configuration.read().clone()
    }

    fn set_configuration(&self, key: &str, value: serde_json::Value) {
        self.configuration.write().set(key, value);
    }

    fn translate(&self, key: &str, args: &[&str]) -> String {
        self.translations.read().translate(key, args)
    }

    fn register_command(&self, definition: CommandDefinition) -> Result<(), ExtensionError> {
        self.services
            .commands
            .register_owned(&self.extension, definition)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use bulwark_api::{ActorContext, ServerState};

    fn context() -> ExtensionContext {
        ExtensionContext::new(
            "greeter",
            HostServices::new(Arc::new(MemoryStore::new())),
            Arc::new(RwLock::new(Translations::new().with("hi", "Hi {0}"))),
            Arc::new(RwLock::new(Configuration::new())),
        )
    }

    #[test]
    fn test_commands_are_owned_by_extension() {
        let context = context();
        context
            .register_command(CommandDefinition::new(["hi"], |inv| {
                inv.reply("hello");
                Ok(())
            }))
            .unwrap();

        let command = context.commands().find("hi").unwrap();
        assert_eq!(command.owner(), "greeter");
        assert!(context
            .commands()
            .dispatch_line(&ActorContext::console(ServerState::Multiplayer), "hi")
            .is_dispatched());

        assert!(matches!(
            context.register_command(CommandDefinition::new(["HI"], |_| Ok(()))),
            Err(ExtensionError::Command(_))
        ));
    }

    #[test]
    fn test_maps_are_shared_with_the_unit() {
        let context = context();
        assert_eq!(context.translate("hi", &["Ann"]), "Hi Ann");

        context.set_configuration("Limit", serde_json::json!(4));
        assert_eq!(context.configuration.read().get::<u32>("Limit"), Some(4));
        context.log(LogLevel::Info, "configured");
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_important_messages_are_marked() {
        let context = context();
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            context.log(LogLevel::Important, "restart required");
            context.log(LogLevel::Info, "routine");
        });

        let output = String::from_utf8(capture.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("important=true"));
        assert!(lines[0].contains("restart required"));
        assert!(lines[1].contains("routine"));
        assert!(!lines[1].contains("important"));
    }
}
