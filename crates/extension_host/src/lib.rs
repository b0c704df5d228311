//! # Extension Host
//!
//! Loads internal services and extensions, isolates their failures and
//! persists their documents.
//!
//! The [`Orchestrator`] owns the lifecycle: services come up in ascending
//! launch index, then the [`ExtensionLoader`] brings in support libraries
//! and extensions, each wrapped in an [`ExtensionUnit`] so that an error or
//! panic in one extension never reaches the host or its neighbours.
//!
//! ```rust,no_run
//! use extension_host::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), HostError> {
//! let services = HostServices::new(Arc::new(JsonFileStore::new("data")));
//! let loader = LibraryLoader::new("extensions", "libraries");
//! let mut host = Orchestrator::new(services, Box::new(loader), OrchestratorConfig::default());
//! host.register_service(GroupManager::new())?;
//! host.register_service(CommandManager::new())?;
//!
//! host.start().await?;
//! host.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod persistence;
pub mod service;
pub mod services;
pub mod settings;
pub mod unit;

pub use context::{ExtensionContext, HostServices};
pub use error::{HostError, StoreError};
pub use loader::{
    DiscoveredExtension, ExtensionLoader, Instantiated, LibraryLoader, StaticLoader,
    CREATE_EXTENSION_SYMBOL,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, StartupReport};
pub use persistence::{
    configuration_namespace, translations_namespace, DocumentStore, JsonFileStore, MemoryStore,
    COMMANDS_NAMESPACE, EXTENSION_MANAGER_NAMESPACE, GROUPS_NAMESPACE,
};
pub use service::{InternalService, ServiceState};
pub use services::{CommandManager, GroupManager};
pub use settings::ExtensionSettings;
pub use unit::{ExtensionUnit, LoadState};
