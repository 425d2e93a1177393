//! AOF writer
//!
//! The single consumer of the log queue. Entries are appended strictly in
//! enqueue order; a `SELECT` entry is injected whenever the acting database
//! differs from the one the log was last switched to.

use super::entry::{encode_entry, select_line, AofMessage};
use super::SyncPolicy;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// AOF writer
pub struct AofWriter {
    file: BufWriter<File>,
    sync_policy: SyncPolicy,
    last_sync: Instant,
    /// Database the log was last switched to; `None` until the first entry
    /// of this session, so a reopened log always restates its context
    current_db: Option<usize>,
}

impl AofWriter {
    /// Open the log for appending, creating it if absent
    pub async fn open<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(AofWriter {
            file: BufWriter::new(file),
            sync_policy,
            last_sync: Instant::now(),
            current_db: None,
        })
    }

    /// Append one command line, switching database first if needed
    pub async fn write_entry(&mut self, db_index: usize, line: &[bytes::Bytes]) -> io::Result<()> {
        if self.current_db != Some(db_index) {
            self.file.write_all(&encode_entry(&select_line(db_index))).await?;
            self.current_db = Some(db_index);
        }
        self.file.write_all(&encode_entry(line)).await
    }

    /// Flush buffered data, then sync according to policy
    pub async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await?;

        match self.sync_policy {
            SyncPolicy::Always => self.sync().await,
            SyncPolicy::EverySecond if self.last_sync.elapsed() >= SYNC_INTERVAL => self.sync().await,
            _ => Ok(()),
        }
    }

    /// Force sync to disk
    pub async fn sync(&mut self) -> io::Result<()> {
        self.file.get_ref().sync_data().await?;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Drain the queue until a shutdown marker arrives or every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<AofMessage>) {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let first = tokio::select! {
                msg = rx.recv() => msg,
                _ = ticker.tick() => {
                    if self.sync_policy == SyncPolicy::EverySecond {
                        if let Err(e) = self.flush().await {
                            warn!("AOF periodic sync failed: {}", e);
                        }
                    }
                    continue;
                }
            };

            let Some(first) = first else {
                self.finish(None).await;
                return;
            };

            // Take whatever else is already queued as one batch
            let mut next = Some(first);
            let mut ack = None;
            let mut written = 0usize;
            while let Some(msg) = next.take() {
                match msg {
                    AofMessage::Entry { db_index, line } => {
                        match self.write_entry(db_index, &line).await {
                            Ok(()) => written += 1,
                            Err(e) => error!("AOF write failed, entry dropped: {}", e),
                        }
                    }
                    AofMessage::Shutdown(tx) => {
                        ack = Some(tx);
                        break;
                    }
                }
                next = rx.try_recv().ok();
            }

            if written > 0 {
                debug!("AOF appended {} entries", written);
            }

            if let Some(tx) = ack {
                self.finish(Some(tx)).await;
                return;
            }

            if let Err(e) = self.flush().await {
                warn!("AOF flush failed: {}", e);
            }
        }
    }

    async fn finish(&mut self, ack: Option<oneshot::Sender<()>>) {
        if let Err(e) = self.file.flush().await {
            error!("AOF final flush failed: {}", e);
        } else if let Err(e) = self.sync().await {
            error!("AOF final sync failed: {}", e);
        }
        if let Some(tx) = ack {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_select_injected_on_db_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("writer.aof");

        let mut writer = AofWriter::open(&path, SyncPolicy::Always).await.unwrap();
        writer.write_entry(0, &[Bytes::from("SET"), Bytes::from("a"), Bytes::from("1")]).await.unwrap();
        writer.write_entry(0, &[Bytes::from("DEL"), Bytes::from("a")]).await.unwrap();
        writer.write_entry(2, &[Bytes::from("FLUSHDB")]).await.unwrap();
        writer.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.matches("SELECT").count(), 2);
        assert!(contents.starts_with("*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n"));
        assert!(contents.ends_with("*2\r\n$6\r\nSELECT\r\n$1\r\n2\r\n*1\r\n$7\r\nFLUSHDB\r\n"));
    }

    #[tokio::test]
    async fn test_reopened_log_restates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.aof");

        for _ in 0..2 {
            let mut writer = AofWriter::open(&path, SyncPolicy::No).await.unwrap();
            writer.write_entry(1, &[Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")]).await.unwrap();
            writer.flush().await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.matches("SELECT").count(), 2);
    }
}
