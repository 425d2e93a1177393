//! Per-connection request loop and handler lifecycle

use super::connection::ClientConnection;
use crate::dispatch::Database;
use crate::protocol::{parse_stream, RespValue};
use futures::future::join_all;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};

/// Serves client connections against one engine
pub struct Handler<D: Database> {
    engine: D,
    active: Mutex<HashMap<u64, Arc<ClientConnection>>>,
    closing: AtomicBool,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl<D: Database> Handler<D> {
    pub fn new(engine: D) -> Self {
        Handler {
            engine,
            active: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The engine commands run against
    pub fn engine(&self) -> &D {
        &self.engine
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Resolves once `close` has been called
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Run the decode, execute, reply loop for one client until it leaves
    pub async fn handle(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if self.is_closing() {
            debug!("Refusing connection from {} during shutdown", addr);
            return;
        }

        let (read_half, write_half) = stream.into_split();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(ClientConnection::new(write_half));
        self.active.lock().insert(id, conn.clone());

        let mut requests = parse_stream(read_half);
        loop {
            let item = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                item = requests.next() => item,
            };

            let reply = match item {
                None => {
                    info!("Client {} disconnected", addr);
                    break;
                }
                Some(Err(e)) if e.is_protocol() => {
                    debug!("Protocol error from {}: {}", addr, e);
                    e.to_reply()
                }
                Some(Err(e)) => {
                    if !self.is_closing() {
                        warn!("Connection error from {}: {}", addr, e);
                    }
                    break;
                }
                Some(Ok(request)) => self.execute(&conn, request).await,
            };

            debug!("Response to {}: {}", addr, reply);
            if let Err(e) = conn.write_value(&reply).await {
                warn!("Failed to write to {}: {}", addr, e);
                break;
            }
        }

        self.active.lock().remove(&id);
        conn.close().await;
        self.engine.after_client_close(conn.as_ref());
        info!("Connection closed: {}", addr);
    }

    async fn execute(&self, conn: &Arc<ClientConnection>, request: RespValue) -> RespValue {
        match request {
            RespValue::Array(items) if items.is_empty() => RespValue::error("ERR empty command"),
            request @ (RespValue::Array(_) | RespValue::BulkString(_)) => match request.into_cmd_line() {
                Some(line) => self.engine.exec(conn.as_ref(), line).await,
                None => RespValue::error("ERR empty command"),
            },
            other => {
                debug!("Unexpected request value: {}", other);
                RespValue::error("ERR Protocol error: 'expected an array of bulk strings'")
            }
        }
    }

    /// Stop accepting clients, disconnect everyone, then close the engine
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Handler shutting down");
        self.shutdown.cancel();

        let connections: Vec<Arc<ClientConnection>> =
            self.active.lock().drain().map(|(_, conn)| conn).collect();
        join_all(connections.iter().map(|conn| conn.close())).await;

        self.engine.close().await;
    }
}
