//! AOF reader
//!
//! Streams command lines back out of a log file with the RESP decoder.

use crate::protocol::{parse_stream, CmdLine, RespError, RespValue};
use futures::{Stream, StreamExt};
use std::io;
use std::path::Path;
use std::pin::Pin;
use tokio::fs::File;

type ValueStream = Pin<Box<dyn Stream<Item = Result<RespValue, RespError>> + Send>>;

/// One decoded unit of the log
#[derive(Debug)]
pub enum LogItem {
    /// A well-formed command line
    Line(CmdLine),
    /// A value that decoded but is not an array of bulk strings
    Unexpected(RespValue),
    /// A malformed entry, decoding resumes after it
    Corrupt(RespError),
}

/// AOF reader
pub struct AofReader {
    values: ValueStream,
}

impl AofReader {
    /// Open a log file. A missing file is not an error and yields `None`.
    pub async fn open<P: AsRef<Path>>(path: P) -> io::Result<Option<Self>> {
        match File::open(path).await {
            Ok(file) => Ok(Some(AofReader {
                values: Box::pin(parse_stream(file)),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Next unit of the log; `None` at end of file
    pub async fn next_item(&mut self) -> Option<LogItem> {
        let item = self.values.next().await?;
        Some(match item {
            Ok(RespValue::Array(items)) => {
                LogItem::Line(items.into_iter().map(Option::unwrap_or_default).collect())
            }
            Ok(other) => LogItem::Unexpected(other),
            Err(e) => LogItem::Corrupt(e),
        })
    }
}
