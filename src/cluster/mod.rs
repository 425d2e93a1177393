//! Cluster mode
//!
//! Keys are spread over the nodes by a consistent hash ring. Each node runs a
//! full standalone engine for the keys it owns and relays everything else to
//! the owning peer through a pool of pipelining clients.

mod pool;
mod ring;
mod router;

pub use pool::{ObjectPool, PeerClientFactory, PoolConfig, PoolError, PoolFactory, PooledObject};
pub use ring::{HashFn, NodeMap};
pub use router::{make_router, Route, FORWARDED};

use crate::commands::CommandError;
use crate::config::ServerConfig;
use crate::dispatch::{Database, StandaloneDatabase};
use crate::protocol::{CmdLine, Connection, RespValue};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::{debug, info};

/// Cluster engine for one node
pub struct ClusterDatabase {
    self_id: String,
    /// Every node, self first
    nodes: Vec<String>,
    ring: NodeMap,
    peers: HashMap<String, ObjectPool<PeerClientFactory>>,
    db: StandaloneDatabase,
    router: HashMap<&'static str, Route>,
}

impl ClusterDatabase {
    /// Build the engine around an existing local engine
    pub fn new(self_id: impl Into<String>, peers: &[String], db: StandaloneDatabase) -> Self {
        let self_id = self_id.into();

        let mut nodes = vec![self_id.clone()];
        for peer in peers {
            if !peer.is_empty() && !nodes.contains(peer) {
                nodes.push(peer.clone());
            }
        }

        let mut ring = NodeMap::new();
        ring.add_node(&nodes);

        let peers = nodes
            .iter()
            .skip(1)
            .map(|peer| {
                let pool = ObjectPool::new(PeerClientFactory::new(peer.clone()), PoolConfig::default());
                (peer.clone(), pool)
            })
            .collect();

        info!("Cluster node {} joined with peers {:?}", self_id, &nodes[1..]);
        ClusterDatabase {
            self_id,
            nodes,
            ring,
            peers,
            db,
            router: make_router(),
        }
    }

    /// Build the engine from configuration, replaying the local log if enabled
    pub async fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let db = StandaloneDatabase::open(config).await?;
        Ok(Self::new(config.self_node.clone(), &config.peers, db))
    }

    /// This node's identifier
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Every node in the cluster, self first
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn ring(&self) -> &NodeMap {
        &self.ring
    }

    /// The engine holding the keys this node owns
    pub fn local(&self) -> &StandaloneDatabase {
        &self.db
    }

    fn owner_of(&self, key: &[u8]) -> String {
        self.ring
            .pick_node(key)
            .map(str::to_string)
            .unwrap_or_else(|| self.self_id.clone())
    }

    /// Execute `line` on `node`, restating the client's database first when
    /// the node is a peer
    async fn relay(&self, node: &str, conn: &dyn Connection, line: CmdLine) -> RespValue {
        if node == self.self_id {
            return self.db.exec_line(conn, &line);
        }

        let Some(pool) = self.peers.get(node) else {
            return RespValue::error(format!("ERR unknown peer '{}'", node));
        };
        let client = match pool.borrow().await {
            Ok(client) => client,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        debug!("Relaying to {} on db {}", node, conn.db_index());
        let select = vec![Bytes::from_static(b"SELECT"), Bytes::from(conn.db_index().to_string())];
        let reply = client.send(select).await;
        if reply.is_error() {
            return reply;
        }
        client.send(line).await
    }
}

impl Database for ClusterDatabase {
    async fn exec(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        let Some(name) = line.first() else {
            return CommandError::EmptyCommand.into();
        };
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();

        let Some(&route) = self.router.get(name.as_str()) else {
            return RespValue::error(format!(
                "ERR unknown command '{}', or not supported in cluster mode",
                name
            ));
        };

        // Malformed commands are rejected before any network hop
        if name != "select" && route != Route::Forwarded {
            if let Err(e) = self.db.registry().lookup(&name, line.len()) {
                return e.into();
            }
        }

        match route {
            Route::Local => self.db.exec_line(conn, &line),
            Route::Direct => self.route_direct(conn, line).await,
            Route::Rename => self.route_rename(conn, line).await,
            Route::Del => self.route_del(conn, line).await,
            Route::FlushDb => self.route_flushdb(conn, line).await,
            Route::Forwarded => self.route_forwarded(conn, &line),
        }
    }

    async fn close(&self) {
        join_all(self.peers.values().map(|pool| pool.close())).await;
        self.db.close().await;
        info!("Cluster node {} closed", self.self_id);
    }

    fn after_client_close(&self, conn: &dyn Connection) {
        self.db.after_client_close(conn);
    }
}
