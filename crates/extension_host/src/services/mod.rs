//! Internal services shipped with the host.

pub mod command_manager;
pub mod group_manager;

pub use command_manager::{CommandManager, COMMAND_MANAGER_LAUNCH_INDEX};
pub use group_manager::{GroupManager, GROUP_MANAGER_LAUNCH_INDEX};
