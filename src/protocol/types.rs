//! RESP value types
//!
//! Defines the reply/value model shared by the codec, the engines and the peer client.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// A command line: element 0 is the command name, the rest are arguments
pub type CmdLine = Vec<Bytes>;

/// RESP value types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple strings: +OK\r\n
    SimpleString(String),

    /// Errors: -Error message\r\n
    Error(String),

    /// Integers: :1000\r\n
    Integer(i64),

    /// Bulk strings: $6\r\nfoobar\r\n
    BulkString(Bytes),

    /// Null bulk string: $-1\r\n
    Null,

    /// Arrays of bulk strings: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    ///
    /// A `None` element is encoded as a null bulk string.
    Array(Vec<Option<Bytes>>),

    /// Null array: *-1\r\n
    NullArray,

    /// The constant +OK\r\n reply
    Ok,

    /// The constant +PONG\r\n reply
    Pong,
}

impl RespValue {
    /// Create a simple string
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Create an error
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Create an integer
    pub fn integer(i: i64) -> Self {
        RespValue::Integer(i)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(b: impl Into<Bytes>) -> Self {
        RespValue::BulkString(b.into())
    }

    /// Create a null bulk value
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Create an array of non-null bulk strings
    pub fn array<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(items.into_iter().map(|b| Some(b.into())).collect())
    }

    /// The generic reply used when a command fails internally
    pub fn unknown_error() -> Self {
        RespValue::error("ERR unknown")
    }

    /// Whether this value is an error reply
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// The message carried by an error reply
    pub fn error_message(&self) -> Option<&str> {
        match self {
            RespValue::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert a request value into a command line.
    ///
    /// Arrays map element-wise (null elements become empty arguments), and a
    /// single bulk string becomes a one-element line such as a bare `PING`.
    pub fn into_cmd_line(self) -> Option<CmdLine> {
        match self {
            RespValue::Array(items) => Some(items.into_iter().map(Option::unwrap_or_default).collect()),
            RespValue::BulkString(b) => Some(vec![b]),
            _ => None,
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "SimpleString({})", s),
            RespValue::Error(e) => write!(f, "Error({})", e),
            RespValue::Integer(i) => write!(f, "Integer({})", i),
            RespValue::BulkString(b) => write!(f, "BulkString({} bytes)", b.len()),
            RespValue::Null => write!(f, "Null"),
            RespValue::Array(arr) => write!(f, "Array({} elements)", arr.len()),
            RespValue::NullArray => write!(f, "NullArray"),
            RespValue::Ok => write!(f, "OK"),
            RespValue::Pong => write!(f, "PONG"),
        }
    }
}

/// RESP parsing errors
///
/// Everything except `Io` is a protocol error: the decoder reports it and
/// resumes at the next line.
#[derive(Debug, Error)]
pub enum RespError {
    /// A header line whose count or length is not a valid integer
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A line or bulk body not terminated by CRLF
    #[error("missing line terminator: {0}")]
    MissingTerminator(String),

    /// A line starting with a byte that is not a RESP sigil
    #[error("unknown type prefix: {0}")]
    UnknownPrefix(String),

    /// Underlying transport failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RespError {
    /// Whether decoding may continue after this error
    pub fn is_protocol(&self) -> bool {
        !matches!(self, RespError::Io(_))
    }

    /// The error reply sent to a client for a protocol error
    pub fn to_reply(&self) -> RespValue {
        RespValue::error(format!("ERR Protocol error: '{}'", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_capability() {
        let err = RespValue::error("ERR boom");
        assert!(err.is_error());
        assert_eq!(err.error_message(), Some("ERR boom"));
        assert!(!RespValue::Ok.is_error());
        assert_eq!(RespValue::Pong.error_message(), None);
    }

    #[test]
    fn test_into_cmd_line() {
        let value = RespValue::Array(vec![Some(Bytes::from("GET")), None]);
        assert_eq!(value.into_cmd_line(), Some(vec![Bytes::from("GET"), Bytes::new()]));

        let ping = RespValue::bulk_string("PING");
        assert_eq!(ping.into_cmd_line(), Some(vec![Bytes::from("PING")]));

        assert_eq!(RespValue::integer(1).into_cmd_line(), None);
    }
}
