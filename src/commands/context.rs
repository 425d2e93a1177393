//! Command execution context

use super::CommandError;
use crate::store::{Db, MemoryStore};
use bytes::Bytes;

/// Context provided to commands during execution
///
/// Gives commands access to the selected database and to the full command
/// line, which is what gets appended to the log on a successful mutation.
pub struct CommandContext<'a> {
    db: &'a Db,
    line: &'a [Bytes],
}

impl<'a> CommandContext<'a> {
    /// Create a context for one command line (name included)
    pub fn new(db: &'a Db, line: &'a [Bytes]) -> Self {
        CommandContext { db, line }
    }

    /// The key space of the selected database
    pub fn store(&self) -> &MemoryStore {
        self.db.data()
    }

    /// Arguments, command name stripped
    pub fn args(&self) -> &[Bytes] {
        self.line.get(1..).unwrap_or_default()
    }

    /// Argument `i` (0-based, command name excluded)
    pub fn arg(&self, i: usize) -> Result<&Bytes, CommandError> {
        self.args()
            .get(i)
            .ok_or_else(|| CommandError::Internal(format!("missing argument {}", i)))
    }

    /// Append the original command line to the log
    pub fn log_to_aof(&self) {
        self.db.add_aof(self.line.to_vec());
    }
}
