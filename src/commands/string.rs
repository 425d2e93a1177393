//! String commands (GET, SET, SETNX, GETSET, STRLEN)

use super::{Command, CommandContext, CommandResult};
use crate::protocol::RespValue;
use crate::store::Value;

/// GET command - Get the value of a key
///
/// Syntax: GET key
pub struct GetCommand;

impl Command for GetCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?;

        Ok(match ctx.store().get(key) {
            Some(Value::String(bytes)) => RespValue::BulkString(bytes),
            None => RespValue::null(),
        })
    }

    fn name(&self) -> &'static str {
        "GET"
    }

    fn arity(&self) -> i32 {
        2
    }
}

/// SET command - Set a key to a value
///
/// Syntax: SET key value
pub struct SetCommand;

impl Command for SetCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?.clone();
        let value = ctx.arg(1)?.clone();

        ctx.store().put(key, Value::String(value));
        ctx.log_to_aof();

        Ok(RespValue::Ok)
    }

    fn name(&self) -> &'static str {
        "SET"
    }

    fn arity(&self) -> i32 {
        3
    }
}

/// SETNX command - Set a key only if it does not exist
///
/// Syntax: SETNX key value
pub struct SetNxCommand;

impl Command for SetNxCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?.clone();
        let value = ctx.arg(1)?.clone();

        let stored = ctx.store().put_if_absent(key, Value::String(value));
        if stored > 0 {
            ctx.log_to_aof();
        }

        Ok(RespValue::integer(stored))
    }

    fn name(&self) -> &'static str {
        "SETNX"
    }

    fn arity(&self) -> i32 {
        3
    }
}

/// GETSET command - Set a key and return its previous value
///
/// Syntax: GETSET key value
pub struct GetSetCommand;

impl Command for GetSetCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?.clone();
        let value = ctx.arg(1)?.clone();

        let previous = ctx.store().replace(key, Value::String(value));
        ctx.log_to_aof();

        Ok(match previous {
            Some(Value::String(bytes)) => RespValue::BulkString(bytes),
            None => RespValue::null(),
        })
    }

    fn name(&self) -> &'static str {
        "GETSET"
    }

    fn arity(&self) -> i32 {
        3
    }
}

/// STRLEN command - Length of the value stored at a key
///
/// Syntax: STRLEN key
pub struct StrLenCommand;

impl Command for StrLenCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let key = ctx.arg(0)?;

        Ok(match ctx.store().get(key) {
            Some(Value::String(bytes)) => RespValue::integer(bytes.len() as i64),
            None => RespValue::integer(0),
        })
    }

    fn name(&self) -> &'static str {
        "STRLEN"
    }

    fn arity(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_line;
    use crate::store::Db;

    fn run(cmd: &dyn Command, db: &Db, parts: &[&str]) -> RespValue {
        let line = cmd_line(parts);
        cmd.execute(&CommandContext::new(db, &line)).unwrap()
    }

    #[test]
    fn test_set_get() {
        let db = Db::new(0);

        assert_eq!(run(&SetCommand, &db, &["SET", "mykey", "myvalue"]), RespValue::Ok);
        assert_eq!(run(&GetCommand, &db, &["GET", "mykey"]), RespValue::bulk_string("myvalue"));
    }

    #[test]
    fn test_get_nonexistent() {
        let db = Db::new(0);
        assert_eq!(run(&GetCommand, &db, &["GET", "nonexistent"]), RespValue::null());
    }

    #[test]
    fn test_setnx_only_first_wins() {
        let db = Db::new(0);

        assert_eq!(run(&SetNxCommand, &db, &["SETNX", "k", "first"]), RespValue::integer(1));
        assert_eq!(run(&SetNxCommand, &db, &["SETNX", "k", "second"]), RespValue::integer(0));
        assert_eq!(run(&GetCommand, &db, &["GET", "k"]), RespValue::bulk_string("first"));
    }

    #[test]
    fn test_getset_returns_previous() {
        let db = Db::new(0);

        assert_eq!(run(&GetSetCommand, &db, &["GETSET", "k", "a"]), RespValue::null());
        assert_eq!(run(&GetSetCommand, &db, &["GETSET", "k", "b"]), RespValue::bulk_string("a"));
        assert_eq!(run(&GetCommand, &db, &["GET", "k"]), RespValue::bulk_string("b"));
    }

    #[test]
    fn test_strlen() {
        let db = Db::new(0);

        assert_eq!(run(&StrLenCommand, &db, &["STRLEN", "k"]), RespValue::integer(0));
        run(&SetCommand, &db, &["SET", "k", "hello"]);
        assert_eq!(run(&StrLenCommand, &db, &["STRLEN", "k"]), RespValue::integer(5));
    }

    #[test]
    fn test_missing_argument_is_internal_error() {
        let db = Db::new(0);
        let line = cmd_line(&["GET"]);
        let result = GetCommand.execute(&CommandContext::new(&db, &line));
        assert!(matches!(result, Err(crate::commands::CommandError::Internal(_))));
    }
}
