//! Append-Only File (AOF) persistence module
//!
//! Provides durability by logging every mutating command line to disk.
//! Entries are RESP arrays, so the file is read back with the same codec
//! that decodes client input. A single writer task owns the file; command
//! executors only ever enqueue.

mod entry;
mod reader;
mod replay;
mod writer;

pub use entry::AofMessage;
pub use reader::{AofReader, LogItem};
pub use replay::{replay, ReplayStats};
pub use writer::AofWriter;

use crate::protocol::CmdLine;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Capacity of the queue between executors and the writer task
pub const QUEUE_CAPACITY: usize = 1 << 16;

/// AOF sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Sync after every drained batch (safest, slowest)
    Always,
    /// Sync at most once per second (balanced)
    #[default]
    #[serde(rename = "everysec")]
    EverySecond,
    /// Let the OS decide when to sync (fastest, least safe)
    No,
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(SyncPolicy::Always),
            "everysec" => Ok(SyncPolicy::EverySecond),
            "no" => Ok(SyncPolicy::No),
            other => Err(format!("unknown fsync policy '{}'", other)),
        }
    }
}

/// AOF configuration
#[derive(Debug, Clone)]
pub struct AofConfig {
    /// Path to the AOF file
    pub path: PathBuf,
    /// Sync policy
    pub sync_policy: SyncPolicy,
    /// Whether to enable AOF
    pub enabled: bool,
}

impl Default for AofConfig {
    fn default() -> Self {
        AofConfig {
            path: PathBuf::from("appendonly.aof"),
            sync_policy: SyncPolicy::default(),
            enabled: false,
        }
    }
}

/// Producer side of the log queue, cloned into every database
#[derive(Debug, Clone)]
pub struct AofSender {
    tx: mpsc::Sender<AofMessage>,
}

impl AofSender {
    /// Queue a command line executed against `db_index`.
    ///
    /// Never waits: when the writer has fallen `QUEUE_CAPACITY` entries
    /// behind, the entry is dropped and a warning is logged.
    pub fn enqueue(&self, db_index: usize, line: CmdLine) {
        match self.tx.try_send(AofMessage::Entry { db_index, line }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("AOF queue is full, dropping entry for db {}", db_index);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("AOF writer has stopped, dropping entry for db {}", db_index);
            }
        }
    }
}

/// Owner of the running writer task
pub struct AofHandler {
    sender: AofSender,
    task: JoinHandle<()>,
    path: PathBuf,
}

impl AofHandler {
    /// Open (creating if absent) the log file and spawn its writer task
    pub async fn start(config: &AofConfig) -> io::Result<Self> {
        let writer = AofWriter::open(&config.path, config.sync_policy).await?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(writer.run(rx));

        info!("AOF writer started at {:?} ({:?})", config.path, config.sync_policy);

        Ok(AofHandler {
            sender: AofSender { tx },
            task,
            path: config.path.clone(),
        })
    }

    /// A producer handle for binding into databases
    pub fn sender(&self) -> AofSender {
        self.sender.clone()
    }

    /// Flush every entry queued so far and stop the writer
    pub async fn close(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.tx.send(AofMessage::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        drop(self.sender);
        if let Err(e) = self.task.await {
            warn!("AOF writer task failed for {:?}: {}", self.path, e);
        }
        info!("AOF writer closed: {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn line(parts: &[&str]) -> CmdLine {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn test_sync_policy_from_str() {
        assert_eq!("always".parse::<SyncPolicy>(), Ok(SyncPolicy::Always));
        assert_eq!("EverySec".parse::<SyncPolicy>(), Ok(SyncPolicy::EverySecond));
        assert_eq!("no".parse::<SyncPolicy>(), Ok(SyncPolicy::No));
        assert!("sometimes".parse::<SyncPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_close_flushes_queued_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = AofConfig {
            path: dir.path().join("test.aof"),
            sync_policy: SyncPolicy::No,
            enabled: true,
        };

        let handler = AofHandler::start(&config).await.unwrap();
        let sender = handler.sender();
        sender.enqueue(0, line(&["SET", "a", "1"]));
        sender.enqueue(0, line(&["SET", "b", "2"]));
        handler.close().await;

        let contents = tokio::fs::read(&config.path).await.unwrap();
        let expected = "*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n\
                        *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
                        *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n";
        assert_eq!(contents, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let config = AofConfig {
            path: dir.path().join("closed.aof"),
            sync_policy: SyncPolicy::Always,
            enabled: true,
        };

        let handler = AofHandler::start(&config).await.unwrap();
        let sender = handler.sender();
        handler.close().await;

        // Must not panic or block
        sender.enqueue(3, line(&["SET", "late", "1"]));
        let contents = tokio::fs::read(&config.path).await.unwrap();
        assert!(contents.is_empty());
    }
}
