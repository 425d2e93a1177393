//! RESP protocol implementation
//!
//! This module handles decoding and encoding of the Redis Serialization Protocol.
//! It is completely independent from other modules (loose coupling).

mod conn;
mod resp;
mod types;

pub use conn::{Connection, FakeConnection};
pub use resp::{parse_stream, RespCodec, RespEncoder};
pub use types::{CmdLine, RespError, RespValue};
