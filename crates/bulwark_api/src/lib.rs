//! # Bulwark API
//!
//! Everything an extension needs to plug into the Bulwark host.
//!
//! An extension implements [`Extension`]. The host hands it an
//! `Arc<dyn HostContext>` scoped to that extension, through which it reaches
//! the shared [`EventSystem`], [`CommandRegistry`] and [`GroupStore`], its own
//! [`Translations`] and [`Configuration`], and the host's logging.
//!
//! ## Writing an extension
//!
//! ```rust
//! use bulwark_api::*;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn new() -> Self {
//!         Self
//!     }
//! }
//!
//! #[async_trait]
//! impl Extension for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!     fn version(&self) -> &str { "1.0.0" }
//!
//!     fn default_translations(&self) -> Translations {
//!         Translations::new().with("hello", "Hello {0}!")
//!     }
//!
//!     async fn load(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
//!         let hello = context.translations();
//!         context.register_command(CommandDefinition::new(["hello"], move |inv| {
//!             inv.reply(hello.translate("hello", &[inv.arg(0).unwrap_or("world")]));
//!             Ok(())
//!         }))?;
//!         Ok(())
//!     }
//!
//!     async fn unload(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
//!         Ok(())
//!     }
//! }
//!
//! create_extension!(Greeter);
//! ```

pub mod events;
pub mod translations;

pub use async_trait::async_trait;
pub use bulwark_commands::{
    self, ActorContext, ActorId, AllowedCaller, AllowedServerState, CommandDefinition,
    CommandError, CommandRegistry, DispatchOutcome, Invocation, ServerState,
};
pub use bulwark_permissions::{self, GroupStore};
pub use events::{
    Event, EventError, EventSystem, EventSystemStats, ExtensionsLoadedEvent,
    ExtensionsUnloadedEvent, EXTENSIONS_LOADED, EXTENSIONS_UNLOADED,
};
pub use translations::{format_positional, Configuration, Translations};

use std::sync::Arc;

/// A dynamically loaded unit of server functionality.
///
/// # Lifecycle
///
/// 1. The host instantiates the extension and reads its defaults
/// 2. Stored translations and configuration are materialised
/// 3. `load()` runs; an error or panic marks the extension failed
/// 4. `unload()` runs at shutdown; owned commands are removed afterwards
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique, stable name. Also names the extension's stored documents.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Translations written to storage on first run.
    fn default_translations(&self) -> Translations {
        Translations::new()
    }

    /// Configuration written to storage on first run.
    fn default_configuration(&self) -> Configuration {
        Configuration::new()
    }

    async fn load(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError>;

    async fn unload(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError>;
}

/// The host as seen from one extension.
pub trait HostContext: Send + Sync {
    fn events(&self) -> Arc<EventSystem>;

    fn commands(&self) -> Arc<CommandRegistry>;

    fn groups(&self) -> Arc<GroupStore>;

    /// Logs through the host's subscriber, tagged with the extension name.
    fn log(&self, level: LogLevel, message: &str);

    /// Snapshot of the extension's materialised translations.
    fn translations(&self) -> Translations;

    /// Snapshot of the extension's materialised configuration.
    fn configuration(&self) -> Configuration;

    /// Changes one configuration value. Saved when the extension unloads.
    fn set_configuration(&self, key: &str, value: serde_json::Value);

    fn translate(&self, key: &str, args: &[&str]) -> String {
        self.translations().translate(key, args)
    }

    /// Registers a command owned by this extension. It is removed again when
    /// the extension unloads.
    fn register_command(&self, definition: CommandDefinition) -> Result<(), ExtensionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    /// Operator-facing notice, logged at info level and marked important.
    Important,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Extension initialization failed: {0}")]
    InitializationFailed(String),
    /// Panic or other unexpected failure
    #[error("Extension runtime error: {0}")]
    Runtime(String),
    #[error("Command registration failed: {0}")]
    Command(#[from] CommandError),
}

/// Seconds since the Unix epoch, 0 if the clock is before it.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Exports the entry points the host's library loader looks for.
///
/// The extension type must provide `fn new() -> Self`. This generates:
/// - `create_extension()`, returning a boxed instance or null if `new` panics
/// - `destroy_extension()`, freeing an instance created by the above
#[macro_export]
macro_rules! create_extension {
    ($extension_type:ty) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn create_extension() -> *mut dyn $crate::Extension {
            // Unwinding across the FFI boundary is undefined behaviour.
            match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                let extension: ::std::boxed::Box<dyn $crate::Extension> =
                    ::std::boxed::Box::new(<$extension_type>::new());
                ::std::boxed::Box::into_raw(extension)
            })) {
                Ok(extension) => extension,
                Err(_) => {
                    eprintln!("Extension construction panicked");
                    ::std::ptr::null_mut::<$extension_type>() as *mut dyn $crate::Extension
                }
            }
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn destroy_extension(extension: *mut dyn $crate::Extension) {
            if extension.is_null() {
                return;
            }
            let _ = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                drop(::std::boxed::Box::from_raw(extension));
            }));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        loads: usize,
    }

    impl Probe {
        fn new() -> Self {
            Self { loads: 0 }
        }
    }

    #[async_trait]
    impl Extension for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        async fn load(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            self.loads += 1;
            Ok(())
        }

        async fn unload(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            Ok(())
        }
    }

    create_extension!(Probe);

    #[test]
    fn test_exported_constructor_round_trip() {
        unsafe {
            let raw = create_extension();
            assert!(!raw.is_null());
            assert_eq!((*raw).name(), "probe");
            assert_eq!((*raw).version(), "0.1.0");
            assert!((*raw).default_translations().is_empty());
            destroy_extension(raw);
        }
    }

    #[test]
    fn test_command_errors_convert() {
        let error: ExtensionError = CommandError::EmptyAliases.into();
        assert!(matches!(error, ExtensionError::Command(CommandError::EmptyAliases)));
        assert!(current_timestamp() > 0);
    }
}
