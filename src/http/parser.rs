//! Response header parsing
//!
//! Incremental parser for the status line and header block of an
//! HTTP/1.1 response. Headers are handed to the response store as they
//! are parsed; the handful the engine itself interprets
//! (`Content-Length`, `Transfer-Encoding`, `Connection`) are tracked
//! regardless of the store's collect filter. Body bytes that arrive in
//! the same transport read as the header block are kept and handed to
//! the body decoder afterwards.

use super::headers::ResponseHeaders;
use super::{Error, Result};
use bytes::{Buf, BytesMut};

/// Find the next CRLF in a buffer
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parsed response head for one exchange.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    /// Declared body length; -1 when unknown or chunked
    pub content_length: i64,
    pub chunked: bool,
    /// Server asked for the connection not to be reused
    pub connection_close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    StatusLine,
    Headers,
    Complete,
}

/// Parse an HTTP response status line
///
/// Format: VERSION STATUS REASON\r\n
/// Example: HTTP/1.1 200 OK\r\n
///
/// Anything that does not look like an HTTP status line means the peer
/// is not speaking HTTP at all.
pub fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let mut parts = line.splitn(3, ' ');

    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(Error::NoHttpServer);
    }

    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(Error::NoHttpServer)?;
    if !(100..1000).contains(&status) {
        return Err(Error::NoHttpServer);
    }

    let reason = parts.next().unwrap_or("").to_string();
    Ok((status, reason))
}

/// Incremental response header parser
pub struct ResponseHeaderParser {
    state: ParserState,
    buffer: BytesMut,
    status: u16,
    reason: String,
    content_length: i64,
    chunked: bool,
    connection_close: bool,
}

impl ResponseHeaderParser {
    /// Create a new parser for one response head
    pub fn new() -> Self {
        ResponseHeaderParser {
            state: ParserState::StatusLine,
            buffer: BytesMut::with_capacity(1024),
            status: 0,
            reason: String::new(),
            content_length: -1,
            chunked: false,
            connection_close: false,
        }
    }

    /// Whether any status-line bytes have been accepted yet
    pub fn started(&self) -> bool {
        self.state != ParserState::StatusLine || !self.buffer.is_empty()
    }

    /// Feed transport bytes to the parser.
    ///
    /// Captured headers go to `store` as they complete. Returns
    /// `Ok(Some(head))` once the empty line terminating the header
    /// block has been consumed, `Ok(None)` when more data is needed.
    pub fn feed(&mut self, data: &[u8], store: &mut ResponseHeaders) -> Result<Option<ResponseHead>> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                ParserState::StatusLine => {
                    let Some(crlf_pos) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    let line = self.buffer.split_to(crlf_pos + 2);
                    let line = String::from_utf8_lossy(&line[..crlf_pos]).to_string();

                    let (status, reason) = parse_status_line(&line)?;
                    self.status = status;
                    self.reason = reason;
                    self.state = ParserState::Headers;
                }

                ParserState::Headers => {
                    let Some(crlf_pos) = find_crlf(&self.buffer) else {
                        return Ok(None);
                    };
                    if crlf_pos == 0 {
                        // Empty line marks end of headers
                        self.buffer.advance(2);
                        self.state = ParserState::Complete;
                        return Ok(Some(self.head()));
                    }

                    let line = self.buffer.split_to(crlf_pos + 2);
                    let line = String::from_utf8_lossy(&line[..crlf_pos]).to_string();
                    self.header_line(&line, store)?;
                }

                ParserState::Complete => return Ok(None),
            }
        }
    }

    /// Body bytes read past the end of the header block.
    pub fn take_remainder(&mut self) -> BytesMut {
        self.buffer.split()
    }

    fn header_line(&mut self, line: &str, store: &mut ResponseHeaders) -> Result<()> {
        let Some(colon_pos) = line.find(':') else {
            return Err(Error::FetchHeadersFailed);
        };
        let name = line[..colon_pos].trim();
        let value = line[colon_pos + 1..].trim();
        if name.is_empty() {
            return Err(Error::FetchHeadersFailed);
        }

        if name.eq_ignore_ascii_case("Content-Length") {
            self.content_length = value
                .parse::<i64>()
                .ok()
                .filter(|len| *len >= 0)
                .ok_or(Error::FetchHeadersFailed)?;
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            if value.eq_ignore_ascii_case("chunked") {
                self.chunked = true;
            } else if !value.eq_ignore_ascii_case("identity") {
                return Err(Error::UnsupportedEncoding);
            }
        } else if name.eq_ignore_ascii_case("Connection") && value.eq_ignore_ascii_case("close") {
            self.connection_close = true;
        }

        store.capture(name, value);
        Ok(())
    }

    fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            reason: self.reason.clone(),
            // Chunked framing overrides any declared length.
            content_length: if self.chunked { -1 } else { self.content_length },
            chunked: self.chunked,
            connection_close: self.connection_close,
        }
    }
}

impl Default for ResponseHeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(data: &[u8]) -> (ResponseHead, ResponseHeaders, BytesMut) {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();
        let head = parser.feed(data, &mut store).unwrap().unwrap();
        (head, store, parser.take_remainder())
    }

    #[test]
    fn test_parse_status_line() {
        let (status, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(status, 200);
        assert_eq!(reason, "OK");

        // Reason phrase is optional
        let (status, reason) = parse_status_line("HTTP/1.0 404").unwrap();
        assert_eq!(status, 404);
        assert_eq!(reason, "");

        assert!(matches!(
            parse_status_line("SMTP ready"),
            Err(Error::NoHttpServer)
        ));
        assert!(matches!(
            parse_status_line("HTTP/1.1 abc OK"),
            Err(Error::NoHttpServer)
        ));
    }

    #[test]
    fn test_simple_head() {
        let (head, store, remainder) =
            feed_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nHello");

        assert_eq!(head.status, 200);
        assert_eq!(head.content_length, 5);
        assert!(!head.chunked);
        assert!(!head.connection_close);
        assert_eq!(store.get("content-type"), Some("text/plain"));
        assert_eq!(&remainder[..], b"Hello");
    }

    #[test]
    fn test_incremental_feed() {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();

        assert!(parser.feed(b"HTTP/1.1 ", &mut store).unwrap().is_none());
        assert!(parser.feed(b"301 Moved\r\n", &mut store).unwrap().is_none());
        assert!(parser
            .feed(b"Location: http://example.com/next\r\n", &mut store)
            .unwrap()
            .is_none());
        let head = parser.feed(b"\r\n", &mut store).unwrap().unwrap();

        assert_eq!(head.status, 301);
        assert_eq!(head.content_length, -1);
        assert_eq!(store.location(), Some("http://example.com/next"));
    }

    #[test]
    fn test_chunked_detection_overrides_length() {
        let (head, _, _) = feed_all(
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        assert!(head.chunked);
        assert_eq!(head.content_length, -1);
    }

    #[test]
    fn test_unsupported_transfer_encoding() {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();
        let result = parser.feed(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n",
            &mut store,
        );
        assert!(matches!(result, Err(Error::UnsupportedEncoding)));
    }

    #[test]
    fn test_connection_close_flag() {
        let (head, _, _) =
            feed_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n");
        assert!(head.connection_close);
    }

    #[test]
    fn test_malformed_header_line() {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();
        let result = parser.feed(b"HTTP/1.1 200 OK\r\nNoColonHere\r\n\r\n", &mut store);
        assert!(matches!(result, Err(Error::FetchHeadersFailed)));
    }

    #[test]
    fn test_negative_content_length_rejected() {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();
        let result = parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: -3\r\n\r\n", &mut store);
        assert!(matches!(result, Err(Error::FetchHeadersFailed)));
    }

    #[test]
    fn test_collect_filter_applies_during_parse() {
        let mut parser = ResponseHeaderParser::new();
        let mut store = ResponseHeaders::new();
        store.set_collect(&["Server"]);

        let head = parser
            .feed(
                b"HTTP/1.1 200 OK\r\nServer: demo\r\nContent-Length: 0\r\nX-Noise: y\r\n\r\n",
                &mut store,
            )
            .unwrap()
            .unwrap();

        // The engine still sees the length even though the store
        // filtered the header out.
        assert_eq!(head.content_length, 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("server"), Some("demo"));
    }
}
