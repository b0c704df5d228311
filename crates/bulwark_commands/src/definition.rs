//! Command definitions and the handler trait.

use crate::actor::{CallerKind, ServerState};
use crate::error::CommandError;
use crate::registry::Invocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Cooldown value meaning the command has no cooldown of its own.
pub const COOLDOWN_DISABLED: i32 = -1;

/// Server states in which a command may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowedServerState {
    Singleplayer,
    Multiplayer,
    Both,
}

impl AllowedServerState {
    pub fn allows(&self, state: ServerState) -> bool {
        match self {
            AllowedServerState::Both => true,
            AllowedServerState::Singleplayer => state == ServerState::Singleplayer,
            AllowedServerState::Multiplayer => state == ServerState::Multiplayer,
        }
    }
}

/// Callers that may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowedCaller {
    Console,
    Player,
    Both,
}

impl AllowedCaller {
    pub fn allows(&self, caller: CallerKind) -> bool {
        match self {
            AllowedCaller::Both => true,
            AllowedCaller::Console => caller == CallerKind::Console,
            AllowedCaller::Player => caller == CallerKind::Player,
        }
    }
}

/// Code run when a command is admitted.
///
/// Handlers receive everything they need through the [`Invocation`]; there
/// is no global "current command" to reach for.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, invocation: &Invocation<'_>) -> Result<(), CommandError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Invocation<'_>) -> Result<(), CommandError> + Send + Sync,
{
    fn execute(&self, invocation: &Invocation<'_>) -> Result<(), CommandError> {
        self(invocation)
    }
}

/// A command: its aliases, gates and handler.
///
/// The first alias is canonical. It is also the command's stable id, used to
/// key cooldown state and persisted operator overrides.
#[derive(Clone)]
pub struct CommandDefinition {
    pub commands: Vec<String>,
    /// Required permission, empty for none
    pub permission: String,
    /// Cooldown in seconds, [`COOLDOWN_DISABLED`] for none
    pub cooldown: i32,
    pub enabled: bool,
    pub minimum_params: usize,
    pub allowed_server_state: AllowedServerState,
    pub allowed_caller: AllowedCaller,
    pub help: String,
    pub usage: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDefinition {
    /// Builds a definition around a closure or function handler.
    pub fn new<I, S, F>(commands: I, handler: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Invocation<'_>) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        Self::with_handler(commands, Arc::new(handler))
    }

    pub fn with_handler<I, S>(commands: I, handler: Arc<dyn CommandHandler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            permission: String::new(),
            cooldown: COOLDOWN_DISABLED,
            enabled: true,
            minimum_params: 0,
            allowed_server_state: AllowedServerState::Both,
            allowed_caller: AllowedCaller::Both,
            help: String::new(),
            usage: String::new(),
            handler,
        }
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }

    pub fn cooldown(mut self, seconds: i32) -> Self {
        self.cooldown = seconds;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn minimum_params(mut self, minimum: usize) -> Self {
        self.minimum_params = minimum;
        self
    }

    pub fn allowed_server_state(mut self, state: AllowedServerState) -> Self {
        self.allowed_server_state = state;
        self
    }

    pub fn allowed_caller(mut self, caller: AllowedCaller) -> Self {
        self.allowed_caller = caller;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// The canonical alias, if any alias was given.
    pub fn canonical(&self) -> Option<&str> {
        self.commands.first().map(String::as_str)
    }

    pub fn matches(&self, token: &str) -> bool {
        self.commands.iter().any(|alias| same_alias(alias, token))
    }

    /// Current operator-tunable values of this definition.
    pub fn settings(&self) -> CommandSettings {
        CommandSettings {
            commands: self.commands.clone(),
            permission: self.permission.clone(),
            cooldown: self.cooldown,
            enabled: self.enabled,
        }
    }

    pub(crate) fn apply_settings(&mut self, settings: &CommandSettings) {
        if !settings.commands.is_empty() {
            self.commands = settings.commands.clone();
        }
        self.permission = settings.permission.clone();
        self.cooldown = settings.cooldown;
        self.enabled = settings.enabled;
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("commands", &self.commands)
            .field("permission", &self.permission)
            .field("cooldown", &self.cooldown)
            .field("enabled", &self.enabled)
            .field("minimum_params", &self.minimum_params)
            .field("allowed_server_state", &self.allowed_server_state)
            .field("allowed_caller", &self.allowed_caller)
            .finish_non_exhaustive()
    }
}

/// Operator overrides for a command, persisted by the command manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandSettings {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub permission: String,
    #[serde(default = "default_cooldown")]
    pub cooldown: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_cooldown() -> i32 {
    COOLDOWN_DISABLED
}

fn default_enabled() -> bool {
    true
}

/// Aliases compare case-insensitively.
pub(crate) fn same_alias(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Invocation<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    #[test]
    fn test_definition_defaults() {
        let def = CommandDefinition::new(["Spy"], noop);
        assert_eq!(def.canonical(), Some("Spy"));
        assert!(def.permission.is_empty());
        assert_eq!(def.cooldown, COOLDOWN_DISABLED);
        assert!(def.enabled);
        assert_eq!(def.minimum_params, 0);
        assert_eq!(def.allowed_server_state, AllowedServerState::Both);
        assert_eq!(def.allowed_caller, AllowedCaller::Both);
    }

    #[test]
    fn test_alias_matching_ignores_case() {
        let def = CommandDefinition::new(["Spy", "screenshot"], noop);
        assert!(def.matches("spy"));
        assert!(def.matches("SCREENSHOT"));
        assert!(!def.matches("spyy"));
    }

    #[test]
    fn test_gates() {
        assert!(AllowedServerState::Both.allows(ServerState::Singleplayer));
        assert!(!AllowedServerState::Multiplayer.allows(ServerState::Singleplayer));
        assert!(AllowedCaller::Console.allows(CallerKind::Console));
        assert!(!AllowedCaller::Console.allows(CallerKind::Player));
    }

    #[test]
    fn test_settings_override() {
        let mut def = CommandDefinition::new(["Spy"], noop).permission("a.b").cooldown(3);
        def.apply_settings(&CommandSettings {
            commands: vec![],
            permission: "c.d".to_string(),
            cooldown: 10,
            enabled: false,
        });
        // An empty alias list keeps the registered aliases.
        assert_eq!(def.commands, ["Spy"]);
        assert_eq!(def.permission, "c.d");
        assert_eq!(def.cooldown, 10);
        assert!(!def.enabled);
    }
}
