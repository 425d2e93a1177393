//! Consistent hash ring
//!
//! Maps keys to node identifiers: each node sits on a 32-bit ring at the hash
//! of its identifier, and a key belongs to the first node at or after the
//! key's own hash, wrapping around past the last one.

use std::collections::HashMap;

/// Hash function placing nodes and keys on the ring
pub type HashFn = fn(&[u8]) -> u32;

/// Routes keys to nodes using consistent hashing
pub struct NodeMap {
    hash_fn: HashFn,
    /// Sorted positions of every node
    hashes: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl NodeMap {
    /// Create an empty ring hashed with CRC32
    pub fn new() -> Self {
        Self::with_hash(crc32fast::hash)
    }

    /// Create an empty ring with a custom hash function
    pub fn with_hash(hash_fn: HashFn) -> Self {
        NodeMap {
            hash_fn,
            hashes: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Number of nodes on the ring
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Place nodes on the ring. Empty and already-present identifiers are ignored.
    pub fn add_node<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let id = id.as_ref();
            if id.is_empty() {
                continue;
            }
            let hash = (self.hash_fn)(id.as_bytes());
            if self.nodes.contains_key(&hash) {
                continue;
            }
            self.hashes.push(hash);
            self.nodes.insert(hash, id.to_string());
        }
        self.hashes.sort_unstable();
    }

    /// Owner of `key`, or `None` on an empty ring
    pub fn pick_node(&self, key: &[u8]) -> Option<&str> {
        if self.hashes.is_empty() {
            return None;
        }

        let hash = (self.hash_fn)(key);
        let mut idx = self.hashes.partition_point(|&h| h < hash);
        if idx == self.hashes.len() {
            idx = 0;
        }
        self.nodes.get(&self.hashes[idx]).map(String::as_str)
    }
}

impl Default for NodeMap {
    fn default() -> Self {
        Self::new()
    }
}
