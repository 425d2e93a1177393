//! Server module
//!
//! Accepts TCP connections and hands each one to a `Handler` task.
//! Any engine implementing `Database` can be served.

mod connection;
mod handler;

pub use connection::ClientConnection;
pub use handler::Handler;

use crate::dispatch::Database;
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accept connections until the handler is closed
pub async fn serve<D: Database>(listener: TcpListener, handler: Arc<Handler<D>>) {
    loop {
        let accepted = tokio::select! {
            _ = handler.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, addr)) => {
                info!("New connection from {}", addr);
                let _ = socket.set_nodelay(true);
                tokio::spawn(handler.clone().handle(socket, addr));
            }
            Err(e) => {
                // Usually descriptor exhaustion; back off instead of spinning
                error!("Accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    info!("Stopped accepting connections");
}

/// Bind `addr`, serve `engine` until `shutdown` resolves, then close gracefully
pub async fn listen_and_serve<D, S>(addr: &str, engine: D, shutdown: S) -> anyhow::Result<()>
where
    D: Database,
    S: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("ringkv listening on {}", listener.local_addr()?);

    let handler = Arc::new(Handler::new(engine));
    let accept_loop = tokio::spawn(serve(listener, handler.clone()));

    shutdown.await;
    info!("Shutdown signal received");

    handler.close().await;
    if let Err(e) = accept_loop.await {
        error!("Accept loop failed: {}", e);
    }
    Ok(())
}
