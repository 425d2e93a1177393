//! Command execution module
//!
//! Provides a unified interface for all commands through the Command trait.
//! Each command family is implemented in a separate file for high cohesion.

mod context;
mod registry;

// Command implementations
mod admin;
mod key;
mod search;
mod string;

pub use context::CommandContext;
pub use registry::CommandRegistry;
pub use search::glob_match;

use crate::protocol::RespValue;
use thiserror::Error;

/// Result of running one executor
pub type CommandResult = Result<RespValue, CommandError>;

/// Command execution trait
///
/// All commands implement this trait with a single execute method.
/// This provides loose coupling between command implementations and the dispatcher.
pub trait Command: Send + Sync {
    /// Execute the command against the context's database
    ///
    /// The dispatcher has already checked the arity, so executors may rely on
    /// the declared argument count being present.
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult;

    /// Get the command name (for debugging/logging)
    fn name(&self) -> &'static str;

    /// Argument count contract, the command name included
    ///
    /// Positive `n` means exactly `n`; negative `n` means at least `-n`.
    fn arity(&self) -> i32;
}

/// Check an argument count (command name included) against an arity contract
pub fn validate_arity(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc == arity as usize
    } else {
        argc >= arity.unsigned_abs() as usize
    }
}

/// Errors surfaced to clients as error replies
///
/// The `Display` text is the exact reply sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR invalid DB index")]
    InvalidDbIndex,

    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    /// An executor hit a state it assumed impossible. Clients only ever see
    /// the generic reply; the detail goes to the log.
    #[error("ERR unknown")]
    Internal(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Internal(_) => RespValue::unknown_error(),
            other => RespValue::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_arity() {
        // Exact
        assert!(validate_arity(2, 2));
        assert!(!validate_arity(2, 1));
        assert!(!validate_arity(2, 3));

        // Minimum
        assert!(validate_arity(-2, 2));
        assert!(validate_arity(-2, 5));
        assert!(!validate_arity(-2, 1));
        assert!(validate_arity(-1, 1));
    }

    #[test]
    fn test_error_replies() {
        let reply: RespValue = CommandError::WrongArity("get".into()).into();
        assert_eq!(reply, RespValue::error("ERR wrong number of arguments for 'get' command"));

        let reply: RespValue = CommandError::Internal("index out of bounds".into()).into();
        assert_eq!(reply, RespValue::error("ERR unknown"));
    }
}

/// Build a command line from string parts (tests only)
#[cfg(test)]
pub(crate) fn cmd_line(parts: &[&str]) -> Vec<bytes::Bytes> {
    parts.iter().map(|p| bytes::Bytes::copy_from_slice(p.as_bytes())).collect()
}
