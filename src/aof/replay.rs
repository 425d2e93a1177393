//! AOF replay
//!
//! Feeds every command line in a log back through an executor. Bad entries
//! are logged and skipped; only failing to open the file aborts the replay.

use super::reader::{AofReader, LogItem};
use crate::protocol::{CmdLine, RespValue};
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Lines executed successfully
    pub applied: usize,
    /// Lines skipped: undecodable, not a command, or rejected by the executor
    pub skipped: usize,
}

/// Replay the log at `path` through `apply`
///
/// `apply` runs one command line and returns its reply; an error reply counts
/// the line as skipped. A missing file replays nothing.
pub async fn replay<P, F>(path: P, mut apply: F) -> io::Result<ReplayStats>
where
    P: AsRef<Path>,
    F: FnMut(CmdLine) -> RespValue,
{
    let path = path.as_ref();
    let Some(mut reader) = AofReader::open(path).await? else {
        return Ok(ReplayStats::default());
    };

    info!("Loading AOF from {:?}", path);
    let mut stats = ReplayStats::default();

    while let Some(item) = reader.next_item().await {
        match item {
            LogItem::Line(line) => {
                let reply = apply(line);
                match reply.error_message() {
                    Some(msg) => {
                        warn!("Failed to replay AOF entry: {}. Skipping.", msg);
                        stats.skipped += 1;
                    }
                    None => stats.applied += 1,
                }
            }
            LogItem::Unexpected(value) => {
                warn!("AOF entry is not a command: {}. Skipping.", value);
                stats.skipped += 1;
            }
            LogItem::Corrupt(e) => {
                warn!("Corrupt AOF entry: {}. Skipping.", e);
                stats.skipped += 1;
            }
        }
    }

    info!(
        "AOF replay finished: {} applied, {} skipped",
        stats.applied, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.aof");
        tokio::fs::write(
            &path,
            "*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nNOPE\r\n+OK\r\n*1\r\n$4\r\nPING\r\n",
        )
        .await
        .unwrap();

        let mut seen = Vec::new();
        let stats = replay(&path, |line| {
            seen.push(line[0].clone());
            if line[0].as_ref() == b"PING" {
                RespValue::Pong
            } else {
                RespValue::error("ERR unknown command 'nope'")
            }
        })
        .await
        .unwrap();

        assert_eq!(stats, ReplayStats { applied: 2, skipped: 2 });
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = replay(dir.path().join("none.aof"), |_| RespValue::Ok).await.unwrap();
        assert_eq!(stats, ReplayStats::default());
    }
}
