//! Finding and instantiating extensions.

use crate::error::HostError;
use async_trait::async_trait;
use bulwark_api::Extension;
use libloading::{Library, Symbol};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Symbol every extension library exports, see `bulwark_api::create_extension!`.
pub const CREATE_EXTENSION_SYMBOL: &[u8] = b"create_extension";

/// An extension the loader knows how to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredExtension {
    pub name: String,
    pub source: PathBuf,
}

/// A live extension instance, plus the library it came from if any.
///
/// Field order matters: the instance is dropped before its library.
pub struct Instantiated {
    pub extension: Box<dyn Extension>,
    pub library: Option<Arc<Library>>,
}

/// Source of extensions for the orchestrator.
#[async_trait]
pub trait ExtensionLoader: Send + Sync {
    /// Loads shared support libraries that extensions link against. They stay
    /// loaded for the loader's lifetime. Returns how many were loaded.
    async fn load_libraries(&self) -> Result<usize, HostError>;

    /// Lists the extensions available, in the order they should load.
    async fn discover(&self) -> Result<Vec<DiscoveredExtension>, HostError>;

    fn instantiate(&self, discovered: &DiscoveredExtension) -> Result<Instantiated, HostError>;
}

fn is_dynamic_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so") | Some("dll") | Some("dylib")
    )
}

/// Lists dynamic libraries in `directory` sorted by file name, creating the
/// directory if it does not exist yet.
async fn list_libraries(directory: &Path) -> Result<Vec<PathBuf>, HostError> {
    if !directory.exists() {
        info!("Creating directory {}", directory.display());
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            HostError::Loader(format!("Failed to create {}: {}", directory.display(), e))
        })?;
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await.map_err(|e| {
        HostError::Loader(format!("Failed to read {}: {}", directory.display(), e))
    })?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HostError::Loader(format!("Failed to read directory entry: {}", e)))?
    {
        let path = entry.path();
        if path.is_file() && is_dynamic_library(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Loads extensions from dynamic libraries with `libloading`.
pub struct LibraryLoader {
    extension_directory: PathBuf,
    library_directory: PathBuf,
    libraries: Mutex<Vec<Library>>,
}

impl LibraryLoader {
    pub fn new(extension_directory: impl AsRef<Path>, library_directory: impl AsRef<Path>) -> Self {
        Self {
            extension_directory: extension_directory.as_ref().to_path_buf(),
            library_directory: library_directory.as_ref().to_path_buf(),
            libraries: Mutex::new(Vec::new()),
        }
    }

    pub fn extension_directory(&self) -> &Path {
        &self.extension_directory
    }
}

#[async_trait]
impl ExtensionLoader for LibraryLoader {
    async fn load_libraries(&self) -> Result<usize, HostError> {
        let mut loaded = 0;
        for path in list_libraries(&self.library_directory).await? {
            // SAFETY: support libraries are trusted operator-installed code.
            match unsafe { Library::new(&path) } {
                Ok(library) => {
                    debug!("Loaded library {}", path.display());
                    self.libraries.lock().push(library);
                    loaded += 1;
                }
                Err(e) => error!("Failed to load library {}: {}", path.display(), e),
            }
        }
        if loaded > 0 {
            info!("Loaded {} support libraries", loaded);
        }
        Ok(loaded)
    }

    async fn discover(&self) -> Result<Vec<DiscoveredExtension>, HostError> {
        let found: Vec<_> = list_libraries(&self.extension_directory)
            .await?
            .into_iter()
            .map(|path| DiscoveredExtension {
                name: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                source: path,
            })
            .collect();
        debug!(
            "Discovered {} extension libraries in {}",
            found.len(),
            self.extension_directory.display()
        );
        Ok(found)
    }

    fn instantiate(&self, discovered: &DiscoveredExtension) -> Result<Instantiated, HostError> {
        let path = &discovered.source;
        debug!("Loading extension library {}", path.display());

        // SAFETY: extension libraries are trusted operator-installed code
        // built against the same `bulwark_api`.
        let library = unsafe {
            Library::new(path).map_err(|e| {
                HostError::Loader(format!("Failed to load {}: {}", path.display(), e))
            })?
        };

        let extension = unsafe {
            let create: Symbol<unsafe extern "C" fn() -> *mut dyn Extension> =
                library.get(CREATE_EXTENSION_SYMBOL).map_err(|e| {
                    HostError::Loader(format!(
                        "{} does not export create_extension: {}",
                        path.display(),
                        e
                    ))
                })?;
            let raw = create();
            if raw.is_null() {
                return Err(HostError::Loader(format!(
                    "create_extension in {} returned null",
                    path.display()
                )));
            }
            Box::from_raw(raw)
        };

        Ok(Instantiated {
            extension,
            library: Some(Arc::new(library)),
        })
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

/// Serves in-process extension factories, for statically linked extensions
/// and tests.
#[derive(Default)]
pub struct StaticLoader {
    factories: Vec<(String, Factory)>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory. Extensions are discovered in the order added.
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self
    }
}

#[async_trait]
impl ExtensionLoader for StaticLoader {
    async fn load_libraries(&self) -> Result<usize, HostError> {
        Ok(0)
    }

    async fn discover(&self) -> Result<Vec<DiscoveredExtension>, HostError> {
        Ok(self
            .factories
            .iter()
            .map(|(name, _)| DiscoveredExtension {
                name: name.clone(),
                source: PathBuf::from(format!("static:{name}")),
            })
            .collect())
    }

    fn instantiate(&self, discovered: &DiscoveredExtension) -> Result<Instantiated, HostError> {
        let (_, factory) = self
            .factories
            .iter()
            .find(|(name, _)| *name == discovered.name)
            .ok_or_else(|| HostError::Loader(format!("No factory for {}", discovered.name)))?;

        match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(extension) => Ok(Instantiated {
                extension,
                library: None,
            }),
            Err(_) => {
                warn!("Factory for {} panicked", discovered.name);
                Err(HostError::Loader(format!(
                    "Factory for {} panicked",
                    discovered.name
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_library_discovery_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for file in ["b_ext.so", "a_ext.dll", "notes.txt", "c_ext.dylib"] {
            std::fs::write(dir.path().join(file), b"").unwrap();
        }
        let loader = LibraryLoader::new(dir.path(), dir.path().join("lib"));

        let names: Vec<_> = loader
            .discover()
            .await
            .unwrap()
            .into_iter()
            .map(|found| found.name)
            .collect();
        assert_eq!(names, ["a_ext", "b_ext", "c_ext"]);
    }

    #[tokio::test]
    async fn test_missing_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let loader = LibraryLoader::new(dir.path().join("ext"), dir.path().join("lib"));

        assert_eq!(loader.load_libraries().await.unwrap(), 0);
        assert!(loader.discover().await.unwrap().is_empty());
        assert!(dir.path().join("ext").is_dir());
        assert!(dir.path().join("lib").is_dir());
    }

    #[tokio::test]
    async fn test_invalid_library_fails_to_instantiate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.so"), b"not a library").unwrap();
        let loader = LibraryLoader::new(dir.path(), dir.path().join("lib"));

        let found = loader.discover().await.unwrap();
        assert!(matches!(
            loader.instantiate(&found[0]),
            Err(HostError::Loader(_))
        ));
    }

    #[tokio::test]
    async fn test_static_loader_unknown_name() {
        let loader = StaticLoader::new();
        let missing = DiscoveredExtension {
            name: "ghost".into(),
            source: PathBuf::from("static:ghost"),
        };
        assert!(loader.discover().await.unwrap().is_empty());
        assert!(loader.instantiate(&missing).is_err());
    }
}
