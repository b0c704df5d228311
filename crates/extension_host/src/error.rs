use bulwark_permissions::GroupError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {namespace}: {source}")]
    Serialization {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid document namespace: '{0}'")]
    InvalidNamespace(String),
}

/// Errors raised by the host's lifecycle machinery.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("A service named '{0}' is already registered")]
    DuplicateService(String),
    #[error("Invalid orchestrator state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Startup aborted: service '{service}' failed: {reason}")]
    StartupAborted { service: String, reason: String },
    #[error("Service '{service}' failed: {reason}")]
    Service { service: String, reason: String },
    #[error("Extension loader error: {0}")]
    Loader(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Group configuration error: {0}")]
    Groups(#[from] GroupError),
    #[error("Malformed document {namespace}: {reason}")]
    MalformedDocument { namespace: String, reason: String },
}
