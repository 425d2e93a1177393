//! Command dispatcher
//!
//! Routes command lines to the executors of the selected database. This is
//! the recovery boundary: whatever an executor returns, the caller gets a
//! single reply value back.

use crate::aof::{self, AofConfig, AofHandler};
use crate::commands::{CommandContext, CommandError, CommandRegistry};
use crate::config::{ServerConfig, DEFAULT_DATABASES};
use crate::protocol::{CmdLine, Connection, FakeConnection, RespValue};
use crate::store::Db;
use anyhow::Context;
use base64::Engine as _;
use bytes::Bytes;
use parking_lot::Mutex;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// An engine the connection handler can serve
///
/// Implemented by the standalone engine and by the cluster engine.
pub trait Database: Send + Sync + 'static {
    /// Execute one command line on behalf of `conn`
    fn exec(&self, conn: &dyn Connection, line: CmdLine) -> impl Future<Output = RespValue> + Send;

    /// Release resources; pending log entries are flushed before this returns
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Hook run once a client connection has gone away
    fn after_client_close(&self, conn: &dyn Connection);
}

/// Standalone engine: a fixed set of numbered databases
pub struct StandaloneDatabase {
    dbs: Vec<Db>,
    registry: CommandRegistry,
    aof: Mutex<Option<AofHandler>>,
}

impl StandaloneDatabase {
    /// Create an engine without durability
    pub fn new(databases: usize) -> Self {
        let count = if databases == 0 { DEFAULT_DATABASES } else { databases };
        StandaloneDatabase {
            dbs: (0..count).map(Db::new).collect(),
            registry: CommandRegistry::new(),
            aof: Mutex::new(None),
        }
    }

    /// Create an engine from configuration, replaying the log if enabled
    pub async fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let engine = Self::new(config.database_count());
        let aof_config = config.to_aof_config();
        if aof_config.enabled {
            engine.attach_aof(&aof_config).await?;
        }
        Ok(engine)
    }

    /// Replay an existing log, then start appending to it.
    ///
    /// Replayed commands run before any database is bound to the writer, so
    /// they are not logged a second time.
    async fn attach_aof(&self, config: &AofConfig) -> anyhow::Result<()> {
        let conn = FakeConnection::new();
        aof::replay(&config.path, |line| self.exec_line(&conn, &line))
            .await
            .with_context(|| format!("failed to replay AOF {:?}", config.path))?;

        let handler = AofHandler::start(config)
            .await
            .with_context(|| format!("failed to open AOF {:?}", config.path))?;
        for db in &self.dbs {
            db.bind_aof(handler.sender());
        }
        *self.aof.lock() = Some(handler);
        Ok(())
    }

    /// Number of databases
    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    /// Database by index
    pub fn db(&self, index: usize) -> Option<&Db> {
        self.dbs.get(index)
    }

    /// The command table
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Execute one command line synchronously
    pub fn exec_line(&self, conn: &dyn Connection, line: &[Bytes]) -> RespValue {
        match self.try_exec(conn, line) {
            Ok(reply) => reply,
            Err(CommandError::Internal(detail)) => {
                error!("Command {} failed internally: {}", display_name(line), detail);
                RespValue::unknown_error()
            }
            Err(e) => e.into(),
        }
    }

    fn try_exec(&self, conn: &dyn Connection, line: &[Bytes]) -> Result<RespValue, CommandError> {
        let Some(raw_name) = line.first() else {
            return Err(CommandError::EmptyCommand);
        };
        let name = String::from_utf8_lossy(raw_name).to_ascii_lowercase();

        if std::str::from_utf8(raw_name).is_err() {
            warn!("Command name is not valid UTF-8: {}", display_name(line));
        }
        debug!("Dispatching command: {}", display_name(line));

        if name == "select" {
            return self.select(conn, line);
        }

        let command = self.registry.lookup(&name, line.len())?;
        let db = self
            .dbs
            .get(conn.db_index())
            .ok_or_else(|| CommandError::Internal(format!("selected db {} missing", conn.db_index())))?;

        command.execute(&CommandContext::new(db, line))
    }

    fn select(&self, conn: &dyn Connection, line: &[Bytes]) -> Result<RespValue, CommandError> {
        if line.len() != 2 {
            return Err(CommandError::WrongArity("select".into()));
        }

        let index: i64 = std::str::from_utf8(&line[1])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CommandError::InvalidDbIndex)?;
        if index < 0 || index as usize >= self.dbs.len() {
            return Err(CommandError::DbIndexOutOfRange);
        }

        conn.select_db(index as usize);
        Ok(RespValue::Ok)
    }
}

impl Database for StandaloneDatabase {
    async fn exec(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        self.exec_line(conn, &line)
    }

    async fn close(&self) {
        let handler = self.aof.lock().take();
        if let Some(handler) = handler {
            handler.close().await;
        }
        info!("Standalone engine closed");
    }

    fn after_client_close(&self, conn: &dyn Connection) {
        debug!("Client left while on db {}", conn.db_index());
    }
}

/// Printable form of a command name; non-UTF-8 names are shown as base64
fn display_name(line: &[Bytes]) -> String {
    match line.first() {
        Some(name) => match std::str::from_utf8(name) {
            Ok(s) => s.to_string(),
            Err(_) => format!("base64:{}", base64::engine::general_purpose::STANDARD.encode(name)),
        },
        None => String::new(),
    }
}
