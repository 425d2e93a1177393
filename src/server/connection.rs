//! Connection handling
//!
//! Server-side state for one client socket: the write half behind a mutex
//! so replies never interleave, and the database the client has selected.

use crate::protocol::{Connection, RespEncoder, RespValue};
use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::warn;

/// How long `close` waits for a reply that is still being written
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One connected client
pub struct ClientConnection {
    writer: Mutex<OwnedWriteHalf>,
    selected_db: AtomicUsize,
}

impl ClientConnection {
    /// Wrap the write half of an accepted socket
    pub fn new(writer: OwnedWriteHalf) -> Self {
        ClientConnection {
            writer: Mutex::new(writer),
            selected_db: AtomicUsize::new(0),
        }
    }

    /// Write raw bytes; empty writes are skipped
    pub async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Encode and send a reply
    pub async fn write_value(&self, value: &RespValue) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(64);
        RespEncoder::encode_to(&mut buf, value);
        self.write(&buf).await
    }

    /// Wait for any in-progress write, then shut the socket down
    pub async fn close(&self) {
        match tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, self.writer.lock()).await {
            Ok(mut writer) => {
                let _ = writer.shutdown().await;
            }
            Err(_) => warn!("Connection still writing after {:?}, dropping it", CLOSE_DRAIN_TIMEOUT),
        }
    }
}

impl Connection for ClientConnection {
    fn db_index(&self) -> usize {
        self.selected_db.load(Ordering::Acquire)
    }

    fn select_db(&self, index: usize) {
        self.selected_db.store(index, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_read, write) = server.into_split();
        (ClientConnection::new(write), client)
    }

    #[tokio::test]
    async fn test_write_value_and_close() {
        let (conn, mut client) = pair().await;
        conn.write_value(&RespValue::Ok).await.unwrap();
        conn.write(b"").await.unwrap();
        conn.close().await;

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"+OK\r\n");
    }

    #[tokio::test]
    async fn test_selected_db() {
        let (conn, _client) = pair().await;
        assert_eq!(conn.db_index(), 0);
        conn.select_db(7);
        assert_eq!(conn.db_index(), 7);
    }
}
