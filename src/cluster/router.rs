//! Cluster command routing
//!
//! A static table from command name to how the command travels: to the node
//! owning its key, to every node, or nowhere at all.

use super::ClusterDatabase;
use crate::commands::CommandError;
use crate::protocol::{CmdLine, Connection, RespValue};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;

/// Prefix a node puts in front of a broadcast line it relays to a peer.
///
/// The receiving node strips it and runs the rest on its own keys, so a
/// broadcast reaches each node exactly once.
pub const FORWARDED: &str = "_forwarded";

/// How a command is executed in cluster mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Runs on the node owning the first key
    Direct,
    /// Runs on this node only
    Local,
    /// Both keys must live on the same node
    Rename,
    /// Runs everywhere; deleted counts are summed
    Del,
    /// Runs everywhere; every node must answer OK
    FlushDb,
    /// A broadcast relayed by another node; runs here without re-routing
    Forwarded,
}

/// Build the routing table. Commands missing from it are rejected.
pub fn make_router() -> HashMap<&'static str, Route> {
    let mut routes = HashMap::new();

    for name in ["get", "set", "setnx", "getset", "strlen", "exists", "type"] {
        routes.insert(name, Route::Direct);
    }
    routes.insert("ping", Route::Local);
    routes.insert("select", Route::Local);
    routes.insert("rename", Route::Rename);
    routes.insert("renamenx", Route::Rename);
    routes.insert("del", Route::Del);
    routes.insert("flushdb", Route::FlushDb);
    routes.insert(FORWARDED, Route::Forwarded);

    routes
}

impl ClusterDatabase {
    /// Run `line` on the node that owns its first key
    pub(super) async fn route_direct(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        let owner = self.owner_of(&line[1]);
        self.relay(&owner, conn, line).await
    }

    /// RENAME / RENAMENX: relayed as one unit when both keys share an owner
    pub(super) async fn route_rename(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        let src_owner = self.owner_of(&line[1]);
        let dest_owner = self.owner_of(&line[2]);
        if src_owner != dest_owner {
            return RespValue::error("ERR rename must be within one peer");
        }
        self.relay(&src_owner, conn, line).await
    }

    /// DEL on every node, summing the deleted counts
    pub(super) async fn route_del(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        let mut deleted = 0;
        for (node, reply) in self.broadcast(conn, &line).await {
            match reply {
                RespValue::Integer(n) => deleted += n,
                other => return aggregate_error(&node, &other),
            }
        }
        RespValue::integer(deleted)
    }

    /// FLUSHDB on every node
    pub(super) async fn route_flushdb(&self, conn: &dyn Connection, line: CmdLine) -> RespValue {
        for (node, reply) in self.broadcast(conn, &line).await {
            if reply != RespValue::Ok {
                return aggregate_error(&node, &reply);
            }
        }
        RespValue::Ok
    }

    /// A line another node relayed as part of its broadcast
    pub(super) fn route_forwarded(&self, conn: &dyn Connection, line: &[Bytes]) -> RespValue {
        if line.len() < 2 {
            return CommandError::WrongArity(FORWARDED.into()).into();
        }
        self.db.exec_line(conn, &line[1..])
    }

    /// Run `line` once on every node concurrently, self included
    async fn broadcast(&self, conn: &dyn Connection, line: &CmdLine) -> Vec<(String, RespValue)> {
        let forwarded: CmdLine = std::iter::once(Bytes::from_static(FORWARDED.as_bytes()))
            .chain(line.iter().cloned())
            .collect();

        join_all(self.nodes.iter().map(|node| {
            let line = if *node == self.self_id {
                line.clone()
            } else {
                forwarded.clone()
            };
            async move { (node.clone(), self.relay(node, conn, line).await) }
        }))
        .await
    }
}

fn aggregate_error(node: &str, reply: &RespValue) -> RespValue {
    let detail = match reply.error_message() {
        Some(msg) => msg.to_string(),
        None => format!("unexpected reply {}", reply),
    };
    RespValue::error(format!("ERR error occurs on {}: {}", node, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table() {
        let routes = make_router();
        assert_eq!(routes.get("get"), Some(&Route::Direct));
        assert_eq!(routes.get("exists"), Some(&Route::Direct));
        assert_eq!(routes.get("select"), Some(&Route::Local));
        assert_eq!(routes.get("renamenx"), Some(&Route::Rename));
        assert_eq!(routes.get("del"), Some(&Route::Del));
        assert_eq!(routes.get("flushdb"), Some(&Route::FlushDb));
        assert_eq!(routes.get(FORWARDED), Some(&Route::Forwarded));
        assert_eq!(routes.get("keys"), None);
    }

    #[test]
    fn test_aggregate_error() {
        let reply = aggregate_error("n1", &RespValue::error("ERR server time out"));
        assert_eq!(reply, RespValue::error("ERR error occurs on n1: ERR server time out"));

        let reply = aggregate_error("n2", &RespValue::integer(1));
        assert!(reply.is_error());
    }
}
