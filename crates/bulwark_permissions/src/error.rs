//! Error types for group graph operations.

/// Errors raised by [`GroupGraph`](crate::GroupGraph) mutations and by the
/// group document codec.
///
/// Graph-integrity errors (`Cycle`, `DuplicateEdge`) are always raised before
/// anything is written, so a failed call leaves the graph exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    /// A group with this id is already registered
    #[error("Group already exists: {0}")]
    DuplicateId(String),
    /// No group with this id is registered
    #[error("Unknown group: {0}")]
    UnknownGroup(String),
    /// The inheritance edge would make the graph cyclic (or is a self-loop)
    #[error("Inheriting {parent} from {group} would create a cycle")]
    Cycle { group: String, parent: String },
    /// The inheritance edge is already present
    #[error("Group {group} already inherits {parent}")]
    DuplicateEdge { group: String, parent: String },
    /// A persisted group document could not be interpreted
    #[error("Malformed group document: {0}")]
    MalformedDocument(String),
}

impl GroupError {
    /// Returns true for errors that protect the acyclic inheritance invariant.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, GroupError::Cycle { .. } | GroupError::DuplicateEdge { .. })
    }
}
