//! Who is invoking a command, and from where.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a command caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorId {
    /// The server console
    Console,
    /// A connected player
    Player(Uuid),
}

impl ActorId {
    pub fn new_player() -> Self {
        ActorId::Player(Uuid::new_v4())
    }

    pub fn caller_kind(&self) -> CallerKind {
        match self {
            ActorId::Console => CallerKind::Console,
            ActorId::Player(_) => CallerKind::Player,
        }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorId::Console => write!(f, "console"),
            ActorId::Player(id) => write!(f, "player:{}", id),
        }
    }
}

/// Kind of caller, checked against a command's allowed callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallerKind {
    Console,
    Player,
}

/// Whether the server is running a local singleplayer session or hosting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Singleplayer,
    Multiplayer,
}

/// Everything dispatch needs to know about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor: ActorId,
    pub server_state: ServerState,
    /// Permission group of the caller. `None` means the default group.
    pub group: Option<String>,
}

impl ActorContext {
    pub fn console(server_state: ServerState) -> Self {
        Self {
            actor: ActorId::Console,
            server_state,
            group: None,
        }
    }

    pub fn player(id: Uuid, server_state: ServerState, group: Option<String>) -> Self {
        Self {
            actor: ActorId::Player(id),
            server_state,
            group,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn caller_kind(&self) -> CallerKind {
        self.actor.caller_kind()
    }
}
