use thiserror::Error;

/// Errors raised by command registration and by command handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Alias '{alias}' of '{command}' is already registered by '{existing}'")]
    DuplicateAlias {
        alias: String,
        command: String,
        existing: String,
    },
    #[error("Command definition has no aliases")]
    EmptyAliases,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0}")]
    Handler(String),
}

impl CommandError {
    /// Shorthand for handlers reporting a failure.
    pub fn handler(message: impl Into<String>) -> Self {
        CommandError::Handler(message.into())
    }
}
