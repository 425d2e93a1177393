//! In-memory storage module
//!
//! Provides the concurrent dictionaries backing each logical database.
//! Each database owns its dictionary and the log sink bound to its index.

mod db;
mod memory;
mod value;

pub use db::Db;
pub use memory::{MemoryStore, RenameOutcome};
pub use value::Value;
