//! Built-in subsystems with a fixed load order.

use crate::context::HostServices;
use crate::error::HostError;
use async_trait::async_trait;
use std::fmt;

/// A statically known part of the host that loads before any extension.
///
/// Services load in ascending [`launch_index`](InternalService::launch_index)
/// and unload in descending order, so a service may rely on every service
/// with a lower index being fully loaded.
#[async_trait]
pub trait InternalService: Send + Sync {
    fn name(&self) -> &str;

    fn launch_index(&self) -> u32;

    async fn load(&mut self, services: &HostServices) -> Result<(), HostError>;

    async fn unload(&mut self, services: &HostServices) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unstarted,
    Loading,
    Running,
    Failed,
    Unloading,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Unstarted => "unstarted",
            ServiceState::Loading => "loading",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
            ServiceState::Unloading => "unloading",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
