//! Admin commands (PING, FLUSHDB)

use super::{Command, CommandContext, CommandResult};
use crate::protocol::RespValue;

/// PING command - Liveness check
///
/// Syntax: PING
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _ctx: &CommandContext<'_>) -> CommandResult {
        Ok(RespValue::Pong)
    }

    fn name(&self) -> &'static str {
        "PING"
    }

    fn arity(&self) -> i32 {
        1
    }
}

/// FLUSHDB command - Remove all keys from the current database
///
/// Syntax: FLUSHDB
pub struct FlushDbCommand;

impl Command for FlushDbCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        ctx.store().clear();
        ctx.log_to_aof();
        Ok(RespValue::Ok)
    }

    fn name(&self) -> &'static str {
        "FLUSHDB"
    }

    fn arity(&self) -> i32 {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_line;
    use crate::store::{Db, Value};
    use bytes::Bytes;

    #[test]
    fn test_ping() {
        let db = Db::new(0);
        let line = cmd_line(&["PING"]);
        assert_eq!(PingCommand.execute(&CommandContext::new(&db, &line)), Ok(RespValue::Pong));
    }

    #[test]
    fn test_flushdb() {
        let db = Db::new(0);
        db.data().put(Bytes::from("a"), Value::string("1"));
        db.data().put(Bytes::from("b"), Value::string("2"));

        let line = cmd_line(&["FLUSHDB"]);
        assert_eq!(FlushDbCommand.execute(&CommandContext::new(&db, &line)), Ok(RespValue::Ok));
        assert!(db.data().is_empty());
    }
}
