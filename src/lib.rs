//! ringkv - An in-memory, Redis-compatible key/value store
//!
//! ringkv is designed with strong cohesion and loose coupling principles:
//! - Each module has a single, well-defined responsibility
//! - Modules communicate through clear, minimal interfaces
//! - The same engine interface serves a single node or a whole cluster

pub mod aof;
pub mod client;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod store;

/// Re-export commonly used types
pub use cluster::ClusterDatabase;
pub use commands::{Command, CommandContext};
pub use config::ServerConfig;
pub use dispatch::{Database, StandaloneDatabase};
pub use protocol::{CmdLine, RespError, RespValue};
pub use store::{Db, MemoryStore};
