//! # Bulwark Commands
//!
//! The command registry every extension registers into, and the single
//! dispatch path that decides whether an invocation runs.
//!
//! Dispatch checks a fixed sequence of gates and reports the first one that
//! fails as a [`DispatchOutcome`] value:
//!
//! 1. an alias matches (case-insensitive, first registration wins)
//! 2. the command is enabled
//! 3. the server state and caller kind are allowed
//! 4. enough arguments were given
//! 5. the caller is not on cooldown
//! 6. the caller's group grants the command's permission
//!
//! Steps 5 and 6 are decided together under one [`dashmap`] entry lock, so a
//! cooldown only starts when an invocation is actually admitted.
//!
//! ```rust
//! use bulwark_commands::{ActorContext, CommandDefinition, CommandRegistry, ServerState};
//! use bulwark_permissions::{GroupGraph, GroupStore};
//! use std::sync::Arc;
//!
//! let registry = CommandRegistry::new(Arc::new(GroupStore::new(GroupGraph::bootstrap())));
//! registry
//!     .register(CommandDefinition::new(["ping"], |inv| {
//!         inv.reply("pong");
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! let outcome = registry.dispatch_line(&ActorContext::console(ServerState::Multiplayer), "ping");
//! assert_eq!(outcome.to_string(), "pong");
//! ```

pub mod actor;
pub mod cooldown;
pub mod definition;
pub mod error;
pub mod registry;

pub use actor::{ActorContext, ActorId, CallerKind, ServerState};
pub use cooldown::{Admission, CooldownTracker};
pub use definition::{
    AllowedCaller, AllowedServerState, CommandDefinition, CommandHandler, CommandSettings,
    COOLDOWN_DISABLED,
};
pub use error::CommandError;
pub use registry::{
    tokenize, CommandRegistry, DispatchOutcome, Invocation, RegisteredCommand, HOST_OWNER,
};
