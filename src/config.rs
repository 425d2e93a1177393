//! Server configuration
//!
//! Every field has a default, so an empty YAML file is a valid configuration.

use crate::aof::{AofConfig, SyncPolicy};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of databases used when none (or zero) is configured
pub const DEFAULT_DATABASES: usize = 16;

/// Main server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub databases: usize,
    pub append_only: bool,
    pub append_filename: PathBuf,
    pub append_fsync: SyncPolicy,
    /// Address other nodes use to reach this one; empty outside a cluster
    pub self_node: String,
    pub peers: Vec<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6379,
            databases: DEFAULT_DATABASES,
            append_only: false,
            append_filename: PathBuf::from("appendonly.aof"),
            append_fsync: SyncPolicy::default(),
            self_node: String::new(),
            peers: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Configured database count, zero meaning the default
    pub fn database_count(&self) -> usize {
        if self.databases == 0 {
            DEFAULT_DATABASES
        } else {
            self.databases
        }
    }

    /// Whether this node should run the cluster engine
    pub fn is_cluster(&self) -> bool {
        !self.self_node.is_empty() && !self.peers.is_empty()
    }

    /// Convert to AofConfig
    pub fn to_aof_config(&self) -> AofConfig {
        AofConfig {
            path: self.append_filename.clone(),
            sync_policy: self.append_fsync,
            enabled: self.append_only,
        }
    }
}
