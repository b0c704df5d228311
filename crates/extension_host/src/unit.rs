//! One loaded extension and its fault boundary.

use crate::context::{ExtensionContext, HostServices};
use crate::error::HostError;
use crate::loader::{DiscoveredExtension, Instantiated};
use crate::persistence::{configuration_namespace, translations_namespace, DocumentStore};
use bulwark_api::{Configuration, Extension, ExtensionError, HostContext, Translations};
use futures::FutureExt;
use libloading::Library;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Discovered,
    Loading,
    Loaded,
    LoadFailed,
    Unloaded,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Discovered => "discovered",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::LoadFailed => "load failed",
            LoadState::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wraps an extension so nothing it does can take the host down.
///
/// Errors and panics from the extension's hooks are caught here, logged and
/// recorded as [`ExtensionUnit::last_error`].
pub struct ExtensionUnit {
    name: String,
    version: String,
    source: PathBuf,
    state: LoadState,
    extension: Box<dyn Extension>,
    translations: Arc<RwLock<Translations>>,
    configuration: Arc<RwLock<Configuration>>,
    last_error: Option<String>,
    // Declared after `extension` so the instance is dropped first.
    _library: Option<Arc<Library>>,
}

impl fmt::Debug for ExtensionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionUnit")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

struct Metadata {
    name: String,
    version: String,
    translations: Translations,
    configuration: Configuration,
}

impl ExtensionUnit {
    /// Wraps a fresh instance. The extension's own metadata hooks run under
    /// `catch_unwind`; if one panics the unit starts out `LoadFailed` under
    /// the discovered name.
    pub fn new(discovered: &DiscoveredExtension, instance: Instantiated) -> Self {
        let Instantiated { extension, library } = instance;
        let metadata = catch_unwind(AssertUnwindSafe(|| Metadata {
            name: extension.name().to_string(),
            version: extension.version().to_string(),
            translations: extension.default_translations(),
            configuration: extension.default_configuration(),
        }));

        let (metadata, state, last_error) = match metadata {
            Ok(metadata) => (metadata, LoadState::Discovered, None),
            Err(panic) => {
                let message = format!("failed to read metadata: {}", panic_to_error(panic));
                error!("Extension {} {}", discovered.name, message);
                let metadata = Metadata {
                    name: discovered.name.clone(),
                    version: String::new(),
                    translations: Translations::new(),
                    configuration: Configuration::new(),
                };
                (metadata, LoadState::LoadFailed, Some(message))
            }
        };

        Self {
            name: metadata.name,
            version: metadata.version,
            source: discovered.source.clone(),
            state,
            translations: Arc::new(RwLock::new(metadata.translations)),
            configuration: Arc::new(RwLock::new(metadata.configuration)),
            extension,
            last_error,
            _library: library,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn translations(&self) -> Translations {
        self.translations.read().clone()
    }

    pub fn configuration(&self) -> Configuration {
        self.configuration.read().clone()
    }

    /// Materialises stored maps and runs the extension's load hook.
    ///
    /// Returns whether the unit ended up `Loaded`. Never propagates a failure.
    pub async fn load(&mut self, services: &HostServices) -> bool {
        if self.state != LoadState::Discovered {
            warn!(
                "Extension {} cannot load from state {}",
                self.name, self.state
            );
            return false;
        }
        self.state = LoadState::Loading;
        info!("Loading extension {} v{}", self.name, self.version);

        if let Err(e) = self.materialise(services.store.as_ref()) {
            self.fail(format!("failed to prepare stored settings: {}", e));
            return false;
        }

        let context: Arc<dyn HostContext> = Arc::new(ExtensionContext::new(
            self.name.clone(),
            services.clone(),
            self.translations.clone(),
            self.configuration.clone(),
        ));

        let outcome = AssertUnwindSafe(self.extension.load(context))
            .catch_unwind()
            .await;
        match flatten(outcome) {
            Ok(()) => {
                self.state = LoadState::Loaded;
                self.last_error = None;
                info!("Extension {} loaded", self.name);
                true
            }
            Err(e) => {
                let removed = services.commands.unregister_owner(&self.name);
                if removed > 0 {
                    debug!("Removed {} command(s) of failed extension {}", removed, self.name);
                }
                self.fail(e.to_string());
                false
            }
        }
    }

    /// Runs the extension's unload hook, removes its commands and saves its
    /// configuration. Only a `Loaded` unit is unloaded.
    pub async fn unload(&mut self, services: &HostServices) {
        if self.state != LoadState::Loaded {
            return;
        }
        info!("Unloading extension {}", self.name);

        let context: Arc<dyn HostContext> = Arc::new(ExtensionContext::new(
            self.name.clone(),
            services.clone(),
            self.translations.clone(),
            self.configuration.clone(),
        ));
        let outcome = AssertUnwindSafe(self.extension.unload(context))
            .catch_unwind()
            .await;
        if let Err(e) = flatten(outcome) {
            error!("Error unloading extension {}: {}", self.name, e);
            self.last_error = Some(e.to_string());
        }

        services.commands.unregister_owner(&self.name);

        let configuration = self.configuration.read().clone();
        if let Err(e) = save(
            services.store.as_ref(),
            &configuration_namespace(&self.name),
            &configuration,
        ) {
            error!("Failed to save configuration of {}: {}", self.name, e);
        }

        self.state = LoadState::Unloaded;
    }

    fn fail(&mut self, message: String) {
        error!("Extension {} failed to load: {}", self.name, message);
        self.last_error = Some(message);
        self.state = LoadState::LoadFailed;
    }

    /// On first run the declared defaults are written out. Afterwards the
    /// stored maps win and only missing default keys are added.
    fn materialise(&mut self, store: &dyn DocumentStore) -> Result<(), HostError> {
        let defaults = self.translations.read().clone();
        let translations = materialise_map(
            store,
            &translations_namespace(&self.name),
            defaults,
            Translations::merge_missing,
        )?;
        *self.translations.write() = translations;

        let defaults = self.configuration.read().clone();
        let configuration = materialise_map(
            store,
            &configuration_namespace(&self.name),
            defaults,
            Configuration::merge_missing,
        )?;
        *self.configuration.write() = configuration;
        Ok(())
    }
}

fn materialise_map<T>(
    store: &dyn DocumentStore,
    namespace: &str,
    defaults: T,
    merge_missing: fn(&mut T, &T) -> bool,
) -> Result<T, HostError>
where
    T: Serialize + DeserializeOwned,
{
    let (document, created) = store.load(namespace)?;
    if created {
        save(store, namespace, &defaults)?;
        return Ok(defaults);
    }

    let mut stored: T =
        serde_json::from_value(document).map_err(|e| HostError::MalformedDocument {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })?;
    if merge_missing(&mut stored, &defaults) {
        debug!("Added missing default keys to {}", namespace);
        save(store, namespace, &stored)?;
    }
    Ok(stored)
}

fn save<T: Serialize>(store: &dyn DocumentStore, namespace: &str, value: &T) -> Result<(), HostError> {
    let document = serde_json::to_value(value).map_err(|e| HostError::MalformedDocument {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    })?;
    store.save(namespace, &document)?;
    Ok(())
}

fn flatten(
    outcome: Result<Result<(), ExtensionError>, Box<dyn Any + Send>>,
) -> Result<(), ExtensionError> {
    match outcome {
        Ok(result) => result,
        Err(panic) => Err(panic_to_error(panic)),
    }
}

pub(crate) fn panic_to_error(panic: Box<dyn Any + Send>) -> ExtensionError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked with unknown payload".to_string()
    };
    ExtensionError::Runtime(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use bulwark_api::{async_trait, CommandDefinition};
    use serde_json::json;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    struct Sample {
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Extension for Sample {
        fn name(&self) -> &str {
            "sample"
        }

        fn version(&self) -> &str {
            "1.2.3"
        }

        fn default_translations(&self) -> Translations {
            Translations::new().with("hello", "Hello {0}").with("bye", "Bye")
        }

        fn default_configuration(&self) -> Configuration {
            Configuration::new().with("Limit", 3)
        }

        async fn load(&mut self, context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            context.register_command(CommandDefinition::new(["sample"], |_| Ok(())))?;
            match self.behaviour {
                Behaviour::Succeed => {
                    context.set_configuration("Loaded", json!(true));
                    Ok(())
                }
                Behaviour::Fail => Err(ExtensionError::InitializationFailed("no config".into())),
                Behaviour::Panic => panic!("load exploded"),
            }
        }

        async fn unload(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            Ok(())
        }
    }

    fn unit(behaviour: Behaviour) -> ExtensionUnit {
        ExtensionUnit::new(
            &DiscoveredExtension {
                name: "sample".into(),
                source: PathBuf::from("static:sample"),
            },
            Instantiated {
                extension: Box::new(Sample { behaviour }),
                library: None,
            },
        )
    }

    #[tokio::test]
    async fn test_load_and_unload() {
        let store = Arc::new(MemoryStore::new());
        let services = HostServices::new(store.clone());
        let mut unit = unit(Behaviour::Succeed);

        assert!(unit.load(&services).await);
        assert_eq!(unit.state(), LoadState::Loaded);
        assert_eq!(unit.version(), "1.2.3");
        assert!(services.commands.find("sample").is_some());
        assert_eq!(
            store.get(&translations_namespace("sample")).unwrap()["hello"],
            "Hello {0}"
        );

        unit.unload(&services).await;
        assert_eq!(unit.state(), LoadState::Unloaded);
        assert!(services.commands.find("sample").is_none());
        let saved = store.get(&configuration_namespace("sample")).unwrap();
        assert_eq!(saved, json!({ "Limit": 3, "Loaded": true }));
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_contained() {
        let services = HostServices::new(Arc::new(MemoryStore::new()));

        for behaviour in [Behaviour::Fail, Behaviour::Panic] {
            let mut unit = unit(behaviour);
            assert!(!unit.load(&services).await);
            assert_eq!(unit.state(), LoadState::LoadFailed);
            assert!(unit.last_error().is_some());
            // Commands registered before the failure are withdrawn.
            assert!(services.commands.find("sample").is_none());

            unit.unload(&services).await;
            assert_eq!(unit.state(), LoadState::LoadFailed);
        }
    }

    struct BrokenDefaults;

    #[async_trait]
    impl Extension for BrokenDefaults {
        fn name(&self) -> &str {
            "broken"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn default_configuration(&self) -> Configuration {
            panic!("defaults exploded")
        }

        async fn load(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            Ok(())
        }

        async fn unload(&mut self, _context: Arc<dyn HostContext>) -> Result<(), ExtensionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_metadata_fails_the_unit() {
        let services = HostServices::new(Arc::new(MemoryStore::new()));
        let mut unit = ExtensionUnit::new(
            &DiscoveredExtension {
                name: "broken_lib".into(),
                source: PathBuf::from("extensions/broken_lib.so"),
            },
            Instantiated {
                extension: Box::new(BrokenDefaults),
                library: None,
            },
        );

        assert_eq!(unit.name(), "broken_lib");
        assert_eq!(unit.state(), LoadState::LoadFailed);
        assert!(unit.last_error().unwrap().contains("defaults exploded"));
        assert!(!unit.load(&services).await);
        assert_eq!(unit.state(), LoadState::LoadFailed);
    }

    #[tokio::test]
    async fn test_stored_values_win_and_missing_keys_are_added() {
        let store = Arc::new(
            MemoryStore::new().with(translations_namespace("sample"), json!({ "hello": "Hoi {0}" })),
        );
        let services = HostServices::new(store.clone());
        let mut unit = unit(Behaviour::Succeed);

        assert!(unit.load(&services).await);
        let translations = unit.translations();
        assert_eq!(translations.translate("hello", &["Ann"]), "Hoi Ann");
        assert_eq!(translations.translate("bye", &[]), "Bye");
        assert_eq!(
            store.get(&translations_namespace("sample")).unwrap(),
            json!({ "hello": "Hoi {0}", "bye": "Bye" })
        );
    }

    #[tokio::test]
    async fn test_malformed_stored_map_fails_load() {
        let store = Arc::new(
            MemoryStore::new().with(configuration_namespace("sample"), json!(["not", "a", "map"])),
        );
        let services = HostServices::new(store);
        let mut unit = unit(Behaviour::Succeed);

        assert!(!unit.load(&services).await);
        assert!(unit.last_error().unwrap().contains("Configuration"));
        // A unit loads at most once.
        assert!(!unit.load(&services).await);
    }
}
