//! Connection context seen by the engines
//!
//! The engines only need the per-connection selected database; writing
//! replies back is the server's job.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-client state an engine reads and mutates while executing a command
pub trait Connection: Send + Sync {
    /// Index of the currently selected database
    fn db_index(&self) -> usize;

    /// Switch the selected database (only `SELECT` calls this)
    fn select_db(&self, index: usize);
}

/// A connection with no socket behind it
///
/// Used when replaying the append-only log and in tests.
#[derive(Debug, Default)]
pub struct FakeConnection {
    selected_db: AtomicUsize,
}

impl FakeConnection {
    /// Create a fake connection on database 0
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connection for FakeConnection {
    fn db_index(&self) -> usize {
        self.selected_db.load(Ordering::Relaxed)
    }

    fn select_db(&self, index: usize) {
        self.selected_db.store(index, Ordering::Relaxed);
    }
}
