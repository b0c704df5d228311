//! # Bulwark Permissions
//!
//! Hierarchical permission groups shared by the host and every extension.
//!
//! A [`Group`] owns its own permissions, chat prefixes/suffixes and an
//! optional cooldown override, and may inherit from other groups. The
//! [`GroupGraph`] keeps the inheritance relation acyclic by rejecting
//! offending edges at insertion time, and flattens a group's ancestry into an
//! [`EffectiveGroup`] on demand. Graphs are small and change rarely, so
//! resolution is never cached.
//!
//! ## Permission matching
//!
//! - `chat.use` matches exactly `chat.use`
//! - `admin.*` matches anything starting with `admin.`
//! - `*` matches every permission
//!
//! ```rust
//! use bulwark_permissions::GroupGraph;
//!
//! let graph = GroupGraph::bootstrap();
//! assert!(graph.has_permission("Admin", "unturned.commands.admin.spy"));
//! assert!(!graph.has_permission("Guest", "unturned.commands.admin.spy"));
//! ```
//!
//! The live graph is published through a [`GroupStore`], which swaps whole
//! graphs atomically so a reload is either fully visible or not at all.

pub mod document;
pub mod error;
pub mod graph;
pub mod group;
pub mod store;

pub use error::GroupError;
pub use graph::{EffectiveGroup, GroupGraph, ALL_PERMISSIONS};
pub use group::{Color, Group, NO_COOLDOWN_OVERRIDE};
pub use store::GroupStore;
