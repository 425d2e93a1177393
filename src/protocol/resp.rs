//! RESP codec
//!
//! Streaming decoder and encoder for the RESP wire format. The decoder is an
//! explicit state machine so that a command split across any number of reads
//! is resumed where it stopped instead of being re-parsed from the start.

use super::types::{RespError, RespValue};
use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead};

const CRLF: &[u8] = b"\r\n";

/// One unit pulled off the input buffer
enum Line {
    /// A CRLF-terminated line, terminator stripped
    Header(Bytes),
    /// A length-prefixed bulk body, terminator stripped
    Body(Bytes),
}

/// Decoder state carried between reads
#[derive(Debug, Default)]
struct ReadState {
    /// Inside an array or bulk string whose elements are still arriving
    reading_multi_line: bool,
    /// Number of elements the outer header announced
    expected_args: usize,
    /// Outer type byte: `*` or `$`
    msg_type: u8,
    /// Elements collected so far
    args: Vec<Bytes>,
    /// Exact body length to read next, set by a `$len` header
    bulk_len: Option<usize>,
}

impl ReadState {
    fn is_finished(&self) -> bool {
        self.expected_args > 0 && self.args.len() == self.expected_args
    }
}

/// RESP codec
///
/// Decoded items are `Result<RespValue, RespError>`: a protocol error is
/// yielded as an item and decoding carries on with the next line, while the
/// codec's own error type only ever carries transport failures.
#[derive(Debug, Default)]
pub struct RespCodec {
    state: ReadState,
}

impl RespCodec {
    /// Create a codec in its initial state
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull the next header line or bulk body off the buffer.
    ///
    /// Returns `None` when more bytes are needed.
    fn next_line(&mut self, buf: &mut BytesMut) -> Option<Result<Line, RespError>> {
        if let Some(len) = self.state.bulk_len {
            // Bodies are read verbatim: embedded CRLFs are legal.
            if buf.len() < len + 2 {
                return None;
            }
            self.state.bulk_len = None;
            let chunk = buf.split_to(len + 2).freeze();
            if !chunk.ends_with(CRLF) {
                return Some(Err(RespError::MissingTerminator(
                    String::from_utf8_lossy(&chunk).into_owned(),
                )));
            }
            return Some(Ok(Line::Body(chunk.slice(..len))));
        }

        let pos = buf.iter().position(|&b| b == b'\n')?;
        let chunk = buf.split_to(pos + 1).freeze();
        if chunk.len() < 2 || chunk[chunk.len() - 2] != b'\r' {
            return Some(Err(RespError::MissingTerminator(
                String::from_utf8_lossy(&chunk).into_owned(),
            )));
        }
        Some(Ok(Line::Header(chunk.slice(..chunk.len() - 2))))
    }

    /// Feed one unit into the state machine, returning a value once complete
    fn feed(&mut self, line: Line) -> Result<Option<RespValue>, RespError> {
        match line {
            Line::Body(body) => {
                self.state.args.push(body);
                Ok(self.take_finished())
            }
            Line::Header(line) if self.state.reading_multi_line => {
                if line.first() == Some(&b'$') {
                    let len = parse_number(&line)?;
                    if len < 0 {
                        self.state.args.push(Bytes::new());
                    } else {
                        self.state.bulk_len = Some(len as usize);
                        return Ok(None);
                    }
                } else {
                    // Inline element without a length header
                    self.state.args.push(line);
                }
                Ok(self.take_finished())
            }
            Line::Header(line) => self.parse_header(line),
        }
    }

    /// Interpret a line that starts a new protocol unit
    fn parse_header(&mut self, line: Bytes) -> Result<Option<RespValue>, RespError> {
        match line.first() {
            Some(b'*') => {
                let count = parse_number(&line)?;
                match count {
                    0 => Ok(Some(RespValue::Array(Vec::new()))),
                    -1 => Ok(Some(RespValue::NullArray)),
                    n if n < 0 => Err(invalid_header(&line)),
                    n => {
                        self.state.reading_multi_line = true;
                        self.state.msg_type = b'*';
                        self.state.expected_args = n as usize;
                        self.state.args = Vec::with_capacity((n as usize).min(1024));
                        Ok(None)
                    }
                }
            }
            Some(b'$') => {
                let len = parse_number(&line)?;
                match len {
                    -1 => Ok(Some(RespValue::Null)),
                    n if n < 0 => Err(invalid_header(&line)),
                    n => {
                        self.state.reading_multi_line = true;
                        self.state.msg_type = b'$';
                        self.state.expected_args = 1;
                        self.state.args = Vec::with_capacity(1);
                        self.state.bulk_len = Some(n as usize);
                        Ok(None)
                    }
                }
            }
            Some(b'+') => Ok(Some(match &line[1..] {
                b"OK" => RespValue::Ok,
                b"PONG" => RespValue::Pong,
                status => RespValue::SimpleString(String::from_utf8_lossy(status).into_owned()),
            })),
            Some(b'-') => Ok(Some(RespValue::Error(
                String::from_utf8_lossy(&line[1..]).into_owned(),
            ))),
            Some(b':') => Ok(Some(RespValue::Integer(parse_number(&line)?))),
            _ => Err(RespError::UnknownPrefix(
                String::from_utf8_lossy(&line).into_owned(),
            )),
        }
    }

    /// Emit the collected value if every announced element has arrived
    fn take_finished(&mut self) -> Option<RespValue> {
        if !self.state.is_finished() {
            return None;
        }
        let state = std::mem::take(&mut self.state);
        let mut args = state.args;
        if state.msg_type == b'$' {
            args.pop().map(RespValue::BulkString)
        } else {
            Some(RespValue::Array(args.into_iter().map(Some).collect()))
        }
    }
}

impl Decoder for RespCodec {
    type Item = Result<RespValue, RespError>;
    type Error = RespError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = match self.next_line(buf) {
                None => return Ok(None),
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.state = ReadState::default();
                    return Ok(Some(Err(e)));
                }
            };

            match self.feed(line) {
                Ok(Some(value)) => return Ok(Some(Ok(value))),
                Ok(None) => continue,
                Err(e) => {
                    self.state = ReadState::default();
                    return Ok(Some(Err(e)));
                }
            }
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        RespEncoder::encode_to(dst, &item);
        Ok(())
    }
}

/// Decode every protocol unit from a byte stream.
///
/// Protocol errors are yielded and decoding resumes at the next line; a
/// transport error is yielded once and ends the stream. The stream also ends,
/// without an error item, when the reader reaches end-of-file cleanly.
pub fn parse_stream<R>(reader: R) -> impl Stream<Item = Result<RespValue, RespError>>
where
    R: AsyncRead + Unpin,
{
    FramedRead::new(reader, RespCodec::new()).map(|item| item.and_then(|value| value))
}

fn parse_number(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(&line[1..])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid_header(line))
}

fn invalid_header(line: &[u8]) -> RespError {
    RespError::InvalidHeader(String::from_utf8_lossy(line).into_owned())
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a command line as an array of bulk strings
    pub fn encode_cmd_line(line: &[Bytes]) -> Bytes {
        let mut buf = BytesMut::new();
        Self::put_header(&mut buf, b'*', line.len());
        for arg in line {
            Self::put_bulk(&mut buf, arg);
        }
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => Self::put_bulk(buf, bytes),
            RespValue::Null => buf.put_slice(b"$-1\r\n"),
            RespValue::Array(arr) if arr.is_empty() => buf.put_slice(b"*0\r\n"),
            RespValue::Array(arr) => {
                Self::put_header(buf, b'*', arr.len());
                for elem in arr {
                    match elem {
                        Some(bytes) => Self::put_bulk(buf, bytes),
                        None => buf.put_slice(b"$-1\r\n"),
                    }
                }
            }
            RespValue::NullArray => buf.put_slice(b"*-1\r\n"),
            RespValue::Ok => buf.put_slice(b"+OK\r\n"),
            RespValue::Pong => buf.put_slice(b"+PONG\r\n"),
        }
    }

    fn put_header(buf: &mut BytesMut, sigil: u8, len: usize) {
        buf.put_u8(sigil);
        buf.put_slice(len.to_string().as_bytes());
        buf.put_slice(CRLF);
    }

    fn put_bulk(buf: &mut BytesMut, bytes: &[u8]) {
        Self::put_header(buf, b'$', bytes.len());
        buf.put_slice(bytes);
        buf.put_slice(CRLF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<Result<RespValue, String>> {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(item) = codec.decode(&mut buf).unwrap() {
            out.push(item.map_err(|e| e.to_string()));
        }
        out
    }

    #[test]
    fn test_parse_simple_string() {
        let items = decode_all("+QUEUED\r\n+OK\r\n+PONG\r\n");
        assert_eq!(items[0], Ok(RespValue::simple_string("QUEUED")));
        assert_eq!(items[1], Ok(RespValue::Ok));
        assert_eq!(items[2], Ok(RespValue::Pong));
    }

    #[test]
    fn test_parse_error_and_integer() {
        let items = decode_all("-Error message\r\n:1000\r\n:-7\r\n");
        assert_eq!(items[0], Ok(RespValue::error("Error message")));
        assert_eq!(items[1], Ok(RespValue::integer(1000)));
        assert_eq!(items[2], Ok(RespValue::integer(-7)));
    }

    #[test]
    fn test_parse_bulk_string() {
        let items = decode_all("$6\r\nfoobar\r\n$-1\r\n$0\r\n\r\n");
        assert_eq!(items[0], Ok(RespValue::bulk_string("foobar")));
        assert_eq!(items[1], Ok(RespValue::Null));
        assert_eq!(items[2], Ok(RespValue::bulk_string("")));
    }

    #[test]
    fn test_parse_array() {
        let items = decode_all("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n*0\r\n*-1\r\n");
        assert_eq!(items[0], Ok(RespValue::array(["foo", "bar"])));
        assert_eq!(items[1], Ok(RespValue::Array(vec![])));
        assert_eq!(items[2], Ok(RespValue::NullArray));
    }

    #[test]
    fn test_binary_safe_body() {
        let items = decode_all("*2\r\n$3\r\nSET\r\n$4\r\na\r\nb\r\n");
        assert_eq!(items, vec![Ok(RespValue::array(["SET", "a\r\nb"]))]);
    }

    #[test]
    fn test_empty_and_negative_elements() {
        let items = decode_all("*3\r\n$3\r\nSET\r\n$0\r\n\r\n$-1\r\n");
        assert_eq!(items, vec![Ok(RespValue::array(["SET", "", ""]))]);
    }

    #[test]
    fn test_partial_input_resumes() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from("*2\r\n$3\r\nGE");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"T\r\n$1");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\r\nk\r\n");
        let value = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(value, RespValue::array(["GET", "k"]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_protocol_error_resumes_at_next_line() {
        let items = decode_all("*x\r\n+OK\r\n");
        assert!(items[0].as_ref().unwrap_err().contains("invalid header"));
        assert_eq!(items[1], Ok(RespValue::Ok));
    }

    #[test]
    fn test_missing_terminator() {
        let items = decode_all("+OK\n$3\r\nfooXY:1\r\n");
        assert!(items[0].as_ref().unwrap_err().contains("missing line terminator"));
        assert!(items[1].as_ref().unwrap_err().contains("missing line terminator"));
        assert_eq!(items[2], Ok(RespValue::integer(1)));
    }

    #[test]
    fn test_unknown_prefix() {
        let items = decode_all("hello\r\n:2\r\n");
        assert!(items[0].as_ref().unwrap_err().contains("unknown type prefix"));
        assert_eq!(items[1], Ok(RespValue::integer(2)));
    }

    #[test]
    fn test_encode_values() {
        assert_eq!(RespEncoder::encode(&RespValue::simple_string("OK")), Bytes::from("+OK\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::Ok), Bytes::from("+OK\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::Pong), Bytes::from("+PONG\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::error("ERR x")), Bytes::from("-ERR x\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::integer(-3)), Bytes::from(":-3\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::bulk_string("foobar")), Bytes::from("$6\r\nfoobar\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::Null), Bytes::from("$-1\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::Array(vec![])), Bytes::from("*0\r\n"));
        assert_eq!(RespEncoder::encode(&RespValue::NullArray), Bytes::from("*-1\r\n"));
        assert_eq!(
            RespEncoder::encode(&RespValue::Array(vec![Some(Bytes::from("a")), None])),
            Bytes::from("*2\r\n$1\r\na\r\n$-1\r\n")
        );
    }

    #[test]
    fn test_round_trip_command_replies() {
        let values = vec![
            RespValue::Ok,
            RespValue::Pong,
            RespValue::simple_string("string"),
            RespValue::error("ERR no such key"),
            RespValue::integer(42),
            RespValue::bulk_string("bar"),
            RespValue::bulk_string(""),
            RespValue::Null,
            RespValue::array(["k1", "k2"]),
            RespValue::Array(vec![]),
        ];

        let mut buf = BytesMut::new();
        for value in &values {
            RespEncoder::encode_to(&mut buf, value);
        }

        let mut codec = RespCodec::new();
        let mut decoded = Vec::new();
        while let Some(item) = codec.decode(&mut buf).unwrap() {
            decoded.push(item.unwrap());
        }
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_encode_cmd_line() {
        let line = vec![Bytes::from("SELECT"), Bytes::from("1")];
        assert_eq!(
            RespEncoder::encode_cmd_line(&line),
            Bytes::from("*2\r\n$6\r\nSELECT\r\n$1\r\n1\r\n")
        );
    }

    #[tokio::test]
    async fn test_parse_stream_across_reads() {
        let reader = tokio_test::io::Builder::new()
            .read(b"*3\r\n$3\r\nSET")
            .read(b"\r\n$3\r\nfoo\r\n$3\r")
            .read(b"\nbar\r\n$4\r\nPING\r\n")
            .build();

        let items: Vec<_> = parse_stream(reader).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &RespValue::array(["SET", "foo", "bar"]));
        assert_eq!(items[1].as_ref().unwrap(), &RespValue::bulk_string("PING"));
    }

    #[tokio::test]
    async fn test_parse_stream_ends_on_transport_error() {
        let reader = tokio_test::io::Builder::new()
            .read(b":1\r\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let items: Vec<_> = parse_stream(reader).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &RespValue::integer(1));
        assert!(!items[1].as_ref().unwrap_err().is_protocol());
    }
}
