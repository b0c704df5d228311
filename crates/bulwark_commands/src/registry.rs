//! Command table, dispatch and operator overrides.

use crate::actor::{ActorContext, ActorId};
use crate::cooldown::{Admission, CooldownTracker};
use crate::definition::{same_alias, CommandDefinition, CommandSettings, COOLDOWN_DISABLED};
use crate::error::CommandError;
use bulwark_permissions::{GroupStore, NO_COOLDOWN_OVERRIDE};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner recorded for commands registered by the host itself.
pub const HOST_OWNER: &str = "host";

/// A command as held by the registry.
#[derive(Debug, Clone)]
pub struct RegisteredCommand {
    id: String,
    owner: String,
    defaults: CommandDefinition,
    definition: CommandDefinition,
}

impl RegisteredCommand {
    /// Stable id: the lowercased canonical alias the command was registered with.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The definition as registered, before operator overrides.
    pub fn defaults(&self) -> &CommandDefinition {
        &self.defaults
    }

    /// The definition dispatch actually uses.
    pub fn definition(&self) -> &CommandDefinition {
        &self.definition
    }
}

/// Everything a handler gets to see about one invocation.
pub struct Invocation<'a> {
    pub actor: &'a ActorContext,
    /// The alias the caller typed
    pub alias: &'a str,
    /// Tokens after the alias
    pub args: &'a [String],
    pub command: &'a RegisteredCommand,
    pub registry: &'a CommandRegistry,
    replies: Mutex<Vec<String>>,
}

impl<'a> Invocation<'a> {
    /// Queues a message for the caller.
    pub fn reply(&self, message: impl Into<String>) {
        self.replies.lock().push(message.into());
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn definition(&self) -> &CommandDefinition {
        self.command.definition()
    }

    fn into_replies(self) -> Vec<String> {
        self.replies.into_inner()
    }
}

/// Result of a dispatch attempt. Rejections are ordinary values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NotFound,
    Disabled,
    WrongServerState,
    WrongCaller,
    TooFewArguments { minimum: usize, usage: String },
    OnCooldown { seconds_remaining: u64 },
    PermissionDenied,
    Dispatched { command: String, replies: Vec<String> },
    HandlerFailed { command: String, message: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::NotFound => write!(f, "Unknown command"),
            DispatchOutcome::Disabled => write!(f, "This command is disabled"),
            DispatchOutcome::WrongServerState => {
                write!(f, "This command cannot be used in the current server mode")
            }
            DispatchOutcome::WrongCaller => write!(f, "You cannot run this command"),
            DispatchOutcome::TooFewArguments { minimum, usage } => {
                if usage.is_empty() {
                    write!(f, "Not enough arguments, expected at least {}", minimum)
                } else {
                    write!(f, "Not enough arguments. Usage: {}", usage)
                }
            }
            DispatchOutcome::OnCooldown { seconds_remaining } => {
                write!(f, "Please wait {} second(s) before using this command again", seconds_remaining)
            }
            DispatchOutcome::PermissionDenied => {
                write!(f, "You do not have permission to run this command")
            }
            DispatchOutcome::Dispatched { replies, .. } => write!(f, "{}", replies.join("\n")),
            DispatchOutcome::HandlerFailed { command, message } => {
                write!(f, "Command '{}' failed: {}", command, message)
            }
        }
    }
}

/// Registered commands plus the authorization state dispatch consults.
pub struct CommandRegistry {
    groups: Arc<GroupStore>,
    commands: RwLock<Vec<Arc<RegisteredCommand>>>,
    overrides: RwLock<HashMap<String, CommandSettings>>,
    cooldowns: CooldownTracker,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.read().len())
            .field("overrides", &self.overrides.read().len())
            .field("cooldowns", &self.cooldowns.len())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new(groups: Arc<GroupStore>) -> Self {
        Self {
            groups,
            commands: RwLock::new(Vec::new()),
            overrides: RwLock::new(HashMap::new()),
            cooldowns: CooldownTracker::new(),
        }
    }

    pub fn groups(&self) -> &Arc<GroupStore> {
        &self.groups
    }

    /// Registers a host-owned command.
    pub fn register(&self, definition: CommandDefinition) -> Result<(), CommandError> {
        self.register_owned(HOST_OWNER, definition)
    }

    /// Registers a command on behalf of `owner`.
    ///
    /// A stored operator override for the command is applied before the
    /// alias collision check, so the aliases an operator chose are the ones
    /// that must be unique.
    pub fn register_owned(
        &self,
        owner: &str,
        definition: CommandDefinition,
    ) -> Result<(), CommandError> {
        let id = definition
            .canonical()
            .ok_or(CommandError::EmptyAliases)?
            .to_lowercase();

        let mut effective = definition.clone();
        if let Some(settings) = self.overrides.read().get(&id) {
            effective.apply_settings(settings);
        }

        let mut commands = self.commands.write();
        for alias in &effective.commands {
            if let Some(existing) = commands.iter().find(|c| c.definition.matches(alias)) {
                return Err(CommandError::DuplicateAlias {
                    alias: alias.clone(),
                    command: id,
                    existing: existing.id.clone(),
                });
            }
        }

        debug!("Registered command '{}' for {}", id, owner);
        commands.push(Arc::new(RegisteredCommand {
            id,
            owner: owner.to_string(),
            defaults: definition,
            definition: effective,
        }));
        Ok(())
    }

    /// Removes a command by id or any of its aliases.
    pub fn unregister(&self, alias: &str) -> Result<Arc<RegisteredCommand>, CommandError> {
        let removed = {
            let mut commands = self.commands.write();
            let position = commands
                .iter()
                .position(|c| same_alias(&c.id, alias) || c.definition.matches(alias))
                .ok_or_else(|| CommandError::UnknownCommand(alias.to_string()))?;
            commands.remove(position)
        };
        self.retire(&removed);
        Ok(removed)
    }

    /// Removes every command registered by `owner`, returning how many went.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let removed: Vec<_> = {
            let mut commands = self.commands.write();
            let (gone, kept): (Vec<_>, Vec<_>) =
                commands.drain(..).partition(|c| c.owner == owner);
            *commands = kept;
            gone
        };
        for command in &removed {
            self.retire(command);
        }
        if !removed.is_empty() {
            info!("Unregistered {} command(s) owned by {}", removed.len(), owner);
        }
        removed.len()
    }

    // Keeps the settings of a removed command so they are still saved and
    // reapplied if it is registered again.
    fn retire(&self, command: &RegisteredCommand) {
        self.cooldowns.forget_command(&command.id);
        self.overrides
            .write()
            .insert(command.id.clone(), command.definition.settings());
    }

    /// Drops an actor's cooldown state, e.g. on disconnect.
    pub fn forget_actor(&self, actor: ActorId) {
        self.cooldowns.forget_actor(actor);
    }

    /// Registered commands in registration order.
    pub fn commands(&self) -> Vec<Arc<RegisteredCommand>> {
        self.commands.read().clone()
    }

    pub fn definitions(&self) -> Vec<CommandDefinition> {
        self.commands
            .read()
            .iter()
            .map(|c| c.definition.clone())
            .collect()
    }

    /// First registered command matching `alias`.
    pub fn find(&self, alias: &str) -> Option<Arc<RegisteredCommand>> {
        self.commands
            .read()
            .iter()
            .find(|c| c.definition.matches(alias))
            .cloned()
    }

    /// Replaces the operator override table. Already registered commands
    /// pick up their override immediately, unless it would give them an
    /// alias another command owns; such an override is dropped.
    pub fn load_overrides(&self, overrides: BTreeMap<String, CommandSettings>) {
        let mut overrides: HashMap<_, _> = overrides
            .into_iter()
            .map(|(id, settings)| (id.to_lowercase(), settings))
            .collect();

        let mut commands = self.commands.write();
        for position in 0..commands.len() {
            let id = commands[position].id.clone();
            let Some(settings) = overrides.get(&id) else {
                continue;
            };

            let clash = settings.commands.iter().find_map(|alias| {
                commands
                    .iter()
                    .enumerate()
                    .find(|(i, c)| *i != position && c.definition.matches(alias))
                    .map(|(_, c)| (alias.clone(), c.id.clone()))
            });
            if let Some((alias, existing)) = clash {
                warn!(
                    "Ignoring override for command '{}': alias '{}' already belongs to '{}'",
                    id, alias, existing
                );
                overrides.remove(&id);
                continue;
            }

            let mut updated = RegisteredCommand::clone(&commands[position]);
            updated.definition.apply_settings(settings);
            commands[position] = Arc::new(updated);
        }
        *self.overrides.write() = overrides;
    }

    /// Changes one command's tunable values and remembers them as an override.
    pub fn apply_settings(&self, alias: &str, settings: CommandSettings) -> Result<(), CommandError> {
        let mut commands = self.commands.write();
        let position = commands
            .iter()
            .position(|c| same_alias(&c.id, alias) || c.definition.matches(alias))
            .ok_or_else(|| CommandError::UnknownCommand(alias.to_string()))?;

        for new_alias in &settings.commands {
            if let Some(other) = commands
                .iter()
                .enumerate()
                .find(|(i, c)| *i != position && c.definition.matches(new_alias))
                .map(|(_, c)| c)
            {
                return Err(CommandError::DuplicateAlias {
                    alias: new_alias.clone(),
                    command: commands[position].id.clone(),
                    existing: other.id.clone(),
                });
            }
        }

        let mut updated = RegisteredCommand::clone(&commands[position]);
        updated.definition.apply_settings(&settings);
        self.overrides.write().insert(updated.id.clone(), settings);
        commands[position] = Arc::new(updated);
        Ok(())
    }

    /// Current settings of every registered command, plus stored overrides
    /// for commands that are not registered right now.
    pub fn settings_document(&self) -> BTreeMap<String, CommandSettings> {
        let mut document: BTreeMap<_, _> = self
            .overrides
            .read()
            .iter()
            .map(|(id, settings)| (id.clone(), settings.clone()))
            .collect();
        for command in self.commands.read().iter() {
            document.insert(command.id.clone(), command.definition.settings());
        }
        document
    }

    /// Tokenizes a console or chat line and dispatches it.
    pub fn dispatch_line(&self, actor: &ActorContext, line: &str) -> DispatchOutcome {
        self.dispatch(actor, &tokenize(line))
    }

    /// Matches `tokens[0]` against the registered aliases and runs the
    /// command if every gate passes.
    ///
    /// Gates are checked in a fixed order: enabled, server state, caller
    /// kind, argument count, cooldown, permission. A cooldown is only started
    /// by an admitted invocation.
    pub fn dispatch(&self, actor: &ActorContext, tokens: &[String]) -> DispatchOutcome {
        let Some((alias, args)) = tokens.split_first() else {
            return DispatchOutcome::NotFound;
        };
        let Some(command) = self.find(alias) else {
            return DispatchOutcome::NotFound;
        };
        let definition = &command.definition;

        if !definition.enabled {
            return DispatchOutcome::Disabled;
        }
        if !definition.allowed_server_state.allows(actor.server_state) {
            return DispatchOutcome::WrongServerState;
        }
        if !definition.allowed_caller.allows(actor.caller_kind()) {
            return DispatchOutcome::WrongCaller;
        }
        if args.len() < definition.minimum_params {
            return DispatchOutcome::TooFewArguments {
                minimum: definition.minimum_params,
                usage: definition.usage.clone(),
            };
        }

        let (permitted, cooldown) = self.authorize(actor, definition);
        match self
            .cooldowns
            .try_admit(&command.id, actor.actor, cooldown, permitted)
        {
            Admission::OnCooldown { seconds_remaining } => {
                return DispatchOutcome::OnCooldown { seconds_remaining }
            }
            Admission::Denied => {
                debug!("{} denied '{}'", actor.actor, command.id);
                return DispatchOutcome::PermissionDenied;
            }
            Admission::Admitted => {}
        }

        let invocation = Invocation {
            actor,
            alias: alias.as_str(),
            args,
            command: &command,
            registry: self,
            replies: Mutex::new(Vec::new()),
        };

        let handler = definition.handler.clone();
        let result = catch_unwind(AssertUnwindSafe(|| handler.execute(&invocation)));
        let message = match result {
            Ok(Ok(())) => {
                debug!("{} ran '{}'", actor.actor, command.id);
                return DispatchOutcome::Dispatched {
                    command: command.id.clone(),
                    replies: invocation.into_replies(),
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        warn!("Command '{}' run by {} failed: {}", command.id, actor.actor, message);
        DispatchOutcome::HandlerFailed {
            command: command.id.clone(),
            message,
        }
    }

    /// Whether the actor may run `definition`, and the cooldown that applies.
    ///
    /// The console is the server operator and is never refused on
    /// permission. Group cooldowns replace the command's own unless unset.
    fn authorize(&self, actor: &ActorContext, definition: &CommandDefinition) -> (bool, i32) {
        let graph = self.groups.snapshot();
        let group = actor
            .group
            .clone()
            .or_else(|| graph.default_group().map(|g| g.id().to_string()));

        let permitted = definition.permission.is_empty()
            || actor.actor == ActorId::Console
            || group
                .as_deref()
                .is_some_and(|g| graph.has_permission(g, &definition.permission));

        let group_cooldown = match (&actor.actor, group.as_deref()) {
            (ActorId::Player(_), Some(g)) => graph
                .resolve_effective(g)
                .map(|effective| effective.cooldown)
                .unwrap_or(NO_COOLDOWN_OVERRIDE),
            _ => NO_COOLDOWN_OVERRIDE,
        };
        let cooldown = if group_cooldown != NO_COOLDOWN_OVERRIDE {
            group_cooldown
        } else {
            definition.cooldown
        };

        (permitted, cooldown.max(COOLDOWN_DISABLED))
    }
}

/// Splits a line on whitespace, keeping double-quoted runs together.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        tokens.push(current);
    }
    tokens
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
