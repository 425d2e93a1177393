//! AOF entry format
//!
//! Each entry is a RESP array of bulk strings, exactly as a client would have
//! sent it. `SELECT <n>` entries mark where the acting database changes.

use crate::protocol::{CmdLine, RespEncoder};
use bytes::Bytes;
use tokio::sync::oneshot;

/// Message travelling from executors to the writer task
#[derive(Debug)]
pub enum AofMessage {
    /// A mutating command line and the database it ran against
    Entry { db_index: usize, line: CmdLine },
    /// Flush and sync everything queued so far, acknowledge, then stop
    Shutdown(oneshot::Sender<()>),
}

/// Encode a command line as a log entry
pub(super) fn encode_entry(line: &[Bytes]) -> Bytes {
    RespEncoder::encode_cmd_line(line)
}

/// The synthetic line that switches the replay context to `db_index`
pub(super) fn select_line(db_index: usize) -> CmdLine {
    vec![Bytes::from_static(b"SELECT"), Bytes::from(db_index.to_string())]
}
