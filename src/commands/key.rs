//! Key commands (DEL, EXISTS, TYPE, RENAME, RENAMENX)

use super::{Command, CommandContext, CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::store::RenameOutcome;

/// DEL command - Delete one or more keys
///
/// Syntax: DEL key [key ...]
pub struct DelCommand;

impl Command for DelCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let deleted = ctx.store().removes(ctx.args());

        // Only an actual deletion is worth replaying
        if deleted > 0 {
            ctx.log_to_aof();
        }

        Ok(RespValue::integer(deleted))
    }

    fn name(&self) -> &'static str {
        "DEL"
    }

    fn arity(&self) -> i32 {
        -2
    }
}

/// EXISTS command - Count how many of the given keys exist
///
/// Syntax: EXISTS key [key ...]
pub struct ExistsCommand;

impl Command for ExistsCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let store = ctx.store();
        let count = ctx.args().iter().filter(|key| store.exists(key)).count();

        Ok(RespValue::integer(count as i64))
    }

    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn arity(&self) -> i32 {
        -2
    }
}

/// TYPE command - Report the kind of value stored at a key
///
/// Syntax: TYPE key
pub struct TypeCommand;

impl Command for TypeCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?;

        let type_name = match ctx.store().get(key) {
            Some(value) => value.type_name(),
            None => "none",
        };

        Ok(RespValue::simple_string(type_name))
    }

    fn name(&self) -> &'static str {
        "TYPE"
    }

    fn arity(&self) -> i32 {
        2
    }
}

/// RENAME command - Move a key, overwriting the destination
///
/// Syntax: RENAME key newkey
pub struct RenameCommand;

impl Command for RenameCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let src = ctx.arg(0)?;
        let dest = ctx.arg(1)?.clone();

        match ctx.store().rename(src, dest, false) {
            RenameOutcome::Renamed => {
                ctx.log_to_aof();
                Ok(RespValue::Ok)
            }
            RenameOutcome::NoSuchKey => Err(CommandError::NoSuchKey),
            RenameOutcome::DestinationExists => {
                Err(CommandError::Internal("rename refused an existing destination".into()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "RENAME"
    }

    fn arity(&self) -> i32 {
        3
    }
}

/// RENAMENX command - Move a key only if the destination does not exist
///
/// Syntax: RENAMENX key newkey
pub struct RenameNxCommand;

impl Command for RenameNxCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let src = ctx.arg(0)?;
        let dest = ctx.arg(1)?.clone();

        match ctx.store().rename(src, dest, true) {
            RenameOutcome::Renamed => {
                ctx.log_to_aof();
                Ok(RespValue::integer(1))
            }
            RenameOutcome::DestinationExists => Ok(RespValue::integer(0)),
            RenameOutcome::NoSuchKey => Err(CommandError::NoSuchKey),
        }
    }

    fn name(&self) -> &'static str {
        "RENAMENX"
    }

    fn arity(&self) -> i32 {
        3
    }
}
