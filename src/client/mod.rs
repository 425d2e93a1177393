//! Pipelining peer client
//!
//! One TCP connection to another node, shared by any number of callers.
//! Requests are written in submission order by a writer task and replies are
//! paired with them in the same order by a reader task, so several requests
//! can be in flight at once without any request ids on the wire.

use crate::protocol::{parse_stream, CmdLine, RespEncoder, RespValue};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Requests accepted but not yet written
const PENDING_CAPACITY: usize = 256;
/// Ceiling on a single `send`
const SEND_TIMEOUT: Duration = Duration::from_secs(3);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const MAX_RECONNECT_ATTEMPTS: usize = 3;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// Bound on how long `close` waits for in-flight requests
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Peer client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection closed")]
    Closed,

    #[error("server time out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

type Completion = oneshot::Sender<Result<RespValue, ClientError>>;

/// A request travelling through the pending and waiting queues
struct Request {
    id: u64,
    args: CmdLine,
    heartbeat: bool,
    done: Completion,
}

impl Request {
    fn fail(self, err: ClientError) {
        let _ = self.done.send(Err(err));
    }
}

/// State shared by the caller-facing handle and the background tasks
struct Shared {
    addr: String,
    /// Write half of the live connection; `None` while reconnecting or closed
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Written requests awaiting their reply, oldest first
    waiting: Mutex<VecDeque<Request>>,
    closed: AtomicBool,
}

impl Shared {
    /// Write one request. It joins the waiting queue before the bytes go out,
    /// so its reply can never arrive ahead of it.
    async fn transmit(&self, req: Request) {
        let payload = RespEncoder::encode_cmd_line(&req.args);
        let mut slot = self.writer.lock().await;
        let Some(writer) = slot.as_mut() else {
            req.fail(ClientError::Closed);
            return;
        };

        debug!("peer {} <- request #{}", self.addr, req.id);
        self.waiting.lock().push_back(req);

        if let Err(e) = writer.write_all(&payload).await {
            warn!("write to peer {} failed: {}", self.addr, e);
            // Holding the writer slot means ours is still the newest entry
            if let Some(req) = self.waiting.lock().pop_back() {
                req.fail(ClientError::Transport(e));
            }
        }
    }

    /// Complete the oldest waiting request with `reply`
    fn complete(&self, reply: RespValue) {
        let req = self.waiting.lock().pop_front();
        match req {
            Some(req) => {
                if req.heartbeat {
                    debug!("peer {} heartbeat answered: {}", self.addr, reply);
                }
                let _ = req.done.send(Ok(reply));
            }
            None => warn!("peer {} sent a reply nobody asked for: {}", self.addr, reply),
        }
    }

    fn has_waiting(&self) -> bool {
        !self.waiting.lock().is_empty()
    }

    fn fail_waiting(&self) {
        let drained: Vec<Request> = self.waiting.lock().drain(..).collect();
        for req in drained {
            req.fail(ClientError::Closed);
        }
    }

    /// Drop the broken connection and dial again.
    ///
    /// Returns the new read half, or `None` once the client is closed or
    /// every attempt failed.
    async fn reconnect(&self) -> Option<OwnedReadHalf> {
        {
            let mut slot = self.writer.lock().await;
            if let Some(mut old) = slot.take() {
                let _ = old.shutdown().await;
            }
            self.fail_waiting();
        }

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let (read_half, write_half) = stream.into_split();
                    *self.writer.lock().await = Some(write_half);
                    info!("reconnected to peer {} (attempt {})", self.addr, attempt);
                    return Some(read_half);
                }
                Err(e) => {
                    warn!("reconnect to peer {} failed (attempt {}): {}", self.addr, attempt, e);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }

        error!("giving up on peer {} after {} attempts", self.addr, MAX_RECONNECT_ATTEMPTS);
        self.closed.store(true, Ordering::Release);
        self.fail_waiting();
        None
    }
}

/// Handles of the background tasks, taken exactly once by `close`
struct Tasks {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

/// Pipelining client for one peer node
pub struct PeerClient {
    shared: Arc<Shared>,
    pending: Mutex<Option<mpsc::Sender<Request>>>,
    next_id: Arc<AtomicU64>,
    tasks: Mutex<Option<Tasks>>,
}

impl PeerClient {
    /// Dial `addr` and start the writer, reader and heartbeat tasks
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            addr: addr.to_string(),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            waiting: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        });
        let next_id = Arc::new(AtomicU64::new(1));
        let (pending_tx, pending_rx) = mpsc::channel(PENDING_CAPACITY);

        let tasks = Tasks {
            writer: tokio::spawn(write_loop(shared.clone(), pending_rx)),
            reader: tokio::spawn(read_loop(shared.clone(), read_half)),
            heartbeat: tokio::spawn(heartbeat_loop(shared.clone(), pending_tx.clone(), next_id.clone())),
        };

        debug!("connected to peer {}", addr);
        Ok(PeerClient {
            shared,
            pending: Mutex::new(Some(pending_tx)),
            next_id,
            tasks: Mutex::new(Some(tasks)),
        })
    }

    /// Address of the peer
    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    /// Whether the client has stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Send one command line and wait for its reply.
    ///
    /// Never fails: timeouts and transport failures come back as error replies.
    pub async fn send(&self, args: CmdLine) -> RespValue {
        match self.request(args).await {
            Ok(reply) => reply,
            Err(ClientError::Timeout) => RespValue::error("ERR server time out"),
            Err(e) => RespValue::error(format!("ERR request failed: {}", e)),
        }
    }

    /// Send one command line, surfacing failures as `ClientError`
    pub async fn request(&self, args: CmdLine) -> Result<RespValue, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let tx = self.pending.lock().clone().ok_or(ClientError::Closed)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        submit(&tx, id, args, false).await
    }

    /// Stop the heartbeat, refuse new requests, let in-flight ones settle,
    /// then close the connection.
    pub async fn close(&self) {
        let Some(tasks) = self.tasks.lock().take() else {
            return;
        };
        self.shared.closed.store(true, Ordering::Release);
        tasks.heartbeat.abort();
        drop(self.pending.lock().take());

        // The writer exits once everything already queued is written
        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, tasks.writer).await.is_err() {
            warn!("peer {} writer did not drain in time", self.shared.addr);
        }

        let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, async {
            while self.shared.has_waiting() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("peer {} still had requests in flight at close", self.shared.addr);
        }

        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        tasks.reader.abort();
        self.shared.fail_waiting();
        debug!("closed peer client {}", self.shared.addr);
    }
}

/// Queue a request and wait for its completion under the send ceiling
async fn submit(
    tx: &mpsc::Sender<Request>,
    id: u64,
    args: CmdLine,
    heartbeat: bool,
) -> Result<RespValue, ClientError> {
    let (done, rx) = oneshot::channel();
    let req = Request { id, args, heartbeat, done };

    let outcome = tokio::time::timeout(SEND_TIMEOUT, async move {
        tx.send(req).await.map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            debug!("request #{} timed out", id);
            Err(ClientError::Timeout)
        }
    }
}

async fn write_loop(shared: Arc<Shared>, mut pending: mpsc::Receiver<Request>) {
    while let Some(req) = pending.recv().await {
        shared.transmit(req).await;
    }
    debug!("peer {} writer stopped", shared.addr);
}

async fn read_loop(shared: Arc<Shared>, read_half: OwnedReadHalf) {
    let mut replies = parse_stream(read_half);
    loop {
        let failure = match replies.next().await {
            Some(Ok(reply)) => {
                shared.complete(reply);
                continue;
            }
            // Pairing is positional, so after a malformed reply nothing can be trusted
            Some(Err(e)) => e.to_string(),
            None => "connection closed by peer".to_string(),
        };

        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        warn!("lost connection to peer {}: {}", shared.addr, failure);

        match shared.reconnect().await {
            Some(read_half) => replies = parse_stream(read_half),
            None => break,
        }
    }
    debug!("peer {} reader stopped", shared.addr);
}

async fn heartbeat_loop(shared: Arc<Shared>, tx: mpsc::Sender<Request>, next_id: Arc<AtomicU64>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let ping = vec![Bytes::from_static(b"PING")];
        if let Err(e) = submit(&tx, id, ping, true).await {
            warn!("heartbeat to peer {} failed: {}", shared.addr, e);
        }
    }
}
