//! Shared, atomically swapped holder of the live group graph.

use crate::error::GroupError;
use crate::graph::{EffectiveGroup, GroupGraph};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Read-mostly owner of the live [`GroupGraph`].
///
/// Readers take an immutable snapshot and never observe a half-applied
/// change. Writers build the next graph off to the side and publish it with a
/// single pointer swap; a failed mutation publishes nothing.
#[derive(Debug)]
pub struct GroupStore {
    current: RwLock<Arc<GroupGraph>>,
    // Serializes writers so two updates cannot both start from the same snapshot.
    writer: Mutex<()>,
}

impl Default for GroupStore {
    fn default() -> Self {
        Self::new(GroupGraph::new())
    }
}

impl GroupStore {
    pub fn new(graph: GroupGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
            writer: Mutex::new(()),
        }
    }

    /// The graph as of now. Later swaps do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<GroupGraph> {
        self.current.read().clone()
    }

    /// Applies `mutation` to a copy of the current graph and publishes the
    /// copy only if the mutation succeeds.
    pub fn update<T, F>(&self, mutation: F) -> Result<T, GroupError>
    where
        F: FnOnce(&mut GroupGraph) -> Result<T, GroupError>,
    {
        let _writer = self.writer.lock();
        let mut next = GroupGraph::clone(&self.snapshot());
        let result = mutation(&mut next)?;
        *self.current.write() = Arc::new(next);
        Ok(result)
    }

    /// Publishes a graph that was built elsewhere, e.g. by a config reload.
    pub fn replace(&self, graph: GroupGraph) -> Arc<GroupGraph> {
        let _writer = self.writer.lock();
        std::mem::replace(&mut *self.current.write(), Arc::new(graph))
    }

    pub fn resolve_effective(&self, group: &str) -> Result<EffectiveGroup, GroupError> {
        self.snapshot().resolve_effective(group)
    }

    pub fn has_permission(&self, group: &str, permission: &str) -> bool {
        self.snapshot().has_permission(group, permission)
    }

    /// Id of the group assigned to actors without an explicit one.
    pub fn default_group_id(&self) -> Option<String> {
        self.snapshot().default_group().map(|group| group.id().to_string())
    }
}
