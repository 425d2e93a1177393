//! A single logical database

use super::memory::MemoryStore;
use crate::aof::AofSender;
use crate::protocol::CmdLine;
use std::sync::OnceLock;

/// One numbered database: a dictionary plus the log sink bound to its index
pub struct Db {
    index: usize,
    data: MemoryStore,
    aof: OnceLock<AofSender>,
}

impl Db {
    /// Create an empty database with the given index
    pub fn new(index: usize) -> Self {
        Db {
            index,
            data: MemoryStore::new(),
            aof: OnceLock::new(),
        }
    }

    /// Index of this database
    pub fn index(&self) -> usize {
        self.index
    }

    /// The key space of this database
    pub fn data(&self) -> &MemoryStore {
        &self.data
    }

    /// Attach the durability pipeline. Only the first call has any effect.
    pub(crate) fn bind_aof(&self, sender: AofSender) {
        let _ = self.aof.set(sender);
    }

    /// Queue a mutating command line for the log; a no-op while unbound
    pub fn add_aof(&self, line: CmdLine) {
        if let Some(sender) = self.aof.get() {
            sender.enqueue(self.index, line);
        }
    }
}
