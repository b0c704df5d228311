use crate::context::HostServices;
use crate::error::HostError;
use crate::persistence::GROUPS_NAMESPACE;
use crate::service::InternalService;
use async_trait::async_trait;
use bulwark_permissions::GroupGraph;
use tracing::info;

pub const GROUP_MANAGER_LAUNCH_INDEX: u32 = 1;

/// Loads the permission groups from the `Groups` document into the shared
/// [`GroupStore`](bulwark_permissions::GroupStore) and saves them on unload.
#[derive(Debug, Default)]
pub struct GroupManager;

impl GroupManager {
    pub fn new() -> Self {
        Self
    }

    /// Re-reads the groups document and swaps the result in whole. A
    /// malformed document leaves the live graph untouched.
    pub fn reload(services: &HostServices) -> Result<usize, HostError> {
        let (document, created) = services.store.load(GROUPS_NAMESPACE)?;
        let graph = if created {
            info!("No groups document found, creating default groups");
            let graph = GroupGraph::bootstrap();
            services.store.save(GROUPS_NAMESPACE, &graph.to_document())?;
            graph
        } else {
            GroupGraph::from_document(&document)?
        };

        let count = graph.len();
        services.groups.replace(graph);
        info!("Loaded {} permission groups", count);
        Ok(count)
    }

    pub fn save(services: &HostServices) -> Result<(), HostError> {
        let document = services.groups.snapshot().to_document();
        services.store.save(GROUPS_NAMESPACE, &document)?;
        Ok(())
    }
}

#[async_trait]
impl InternalService for GroupManager {
    fn name(&self) -> &str {
        "GroupManager"
    }

    fn launch_index(&self) -> u32 {
        GROUP_MANAGER_LAUNCH_INDEX
    }

    async fn load(&mut self, services: &HostServices) -> Result<(), HostError> {
        Self::reload(services).map(|_| ())
    }

    async fn unload(&mut self, services: &HostServices) -> Result<(), HostError> {
        Self::save(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_run_bootstraps_and_saves() {
        let store = Arc::new(MemoryStore::new());
        let services = HostServices::new(store.clone());

        GroupManager::new().load(&services).await.unwrap();

        assert!(services
            .groups
            .has_permission("Admin", "unturned.commands.admin.spy"));
        let saved = store.get(GROUPS_NAMESPACE).unwrap();
        assert_eq!(saved["Admin"]["Inherits"], json!(["Guest"]));
    }

    #[tokio::test]
    async fn test_reload_rejects_malformed_document() {
        let store = Arc::new(MemoryStore::new());
        let services = HostServices::new(store.clone());
        GroupManager::reload(&services).unwrap();
        let before = services.groups.snapshot();

        store
            .save(GROUPS_NAMESPACE, &json!({ "Guest": { "Cooldown": "soon" } }))
            .unwrap();
        assert!(matches!(
            GroupManager::reload(&services),
            Err(HostError::Groups(_))
        ));
        assert_eq!(*services.groups.snapshot(), *before);

        store
            .save(GROUPS_NAMESPACE, &json!({ "Vip": { "Default": true, "Permissions": "vip.*" } }))
            .unwrap();
        assert_eq!(GroupManager::reload(&services).unwrap(), 1);
        assert_eq!(services.groups.default_group_id().as_deref(), Some("Vip"));
    }

    #[tokio::test]
    async fn test_unload_saves_changes() {
        let store = Arc::new(MemoryStore::new());
        let services = HostServices::new(store.clone());
        let mut manager = GroupManager::new();
        manager.load(&services).await.unwrap();

        services
            .groups
            .update(|graph| graph.add_permission("Guest", "chat.use"))
            .unwrap();
        manager.unload(&services).await.unwrap();

        let saved = store.get(GROUPS_NAMESPACE).unwrap();
        assert_eq!(
            saved["Guest"]["Permissions"],
            json!(["unturned.commands.nonadmin.*", "chat.use"])
        );
    }
}
