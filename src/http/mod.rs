//! HTTP/1.1 client protocol engine
//!
//! This module drives a single request/response exchange over an
//! already-established byte transport, reuses that transport across
//! requests to the same host, follows redirects with method-aware
//! rules and decodes fixed-length or chunked response bodies.
//!
//! # Architecture
//!
//! The engine uses a session operations abstraction that allows
//! seamless switching between plain TCP and TLS connections:
//!
//! - `SessionOps` trait defines transport operations (poll, read, write, close)
//! - `HttpSession` wraps a transport and applies the configured timeout
//! - `HttpClient` owns the exchange state machine and is transparent to
//!   the underlying transport
//!
//! # Examples
//!
//! ```no_run
//! use httpc::http::HttpClient;
//!
//! let mut client = HttpClient::new();
//! client.begin("http://127.0.0.1:8080/status");
//!
//! let code = client.get();
//! assert_eq!(code, 200);
//! let body = client.get_string();
//! client.end();
//! # let _ = body;
//! ```

pub mod body;
pub mod client;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;
pub mod transfer;

pub use body::BodyReader;
pub use client::{ExchangeObserver, HttpClient};
pub use headers::{RequestHeaders, ResponseHeaders};
pub use message::{FollowRedirects, Method, Target};
pub use parser::{ResponseHead, ResponseHeaderParser};
pub use session::{FdSessionOps, HttpSession, SessionOps, Transport};
pub use transfer::BodySource;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of client failure kinds.
///
/// Each variant has a fixed negative wire code (see [`Error::code`])
/// so callers that only look at the integer returned by the send
/// operations can distinguish every failure class. The display strings
/// are the human-readable text returned by [`error_to_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("send header failed")]
    SendHeaderFailed,

    #[error("send payload failed")]
    SendPayloadFailed,

    #[error("not connected")]
    NotConnected,

    #[error("connection lost")]
    ConnectionLost,

    #[error("no body sink")]
    NoBodySink,

    #[error("no HTTP server")]
    NoHttpServer,

    #[error("not enough memory")]
    InsufficientMemory,

    #[error("Transfer-Encoding not supported")]
    UnsupportedEncoding,

    #[error("stream write error")]
    StreamWriteFailed,

    #[error("read timeout")]
    ReadTimeout,

    #[error("fetch headers error")]
    FetchHeadersFailed,

    #[error("client configuration error")]
    ClientConfigError,

    #[error("redirect limit reached")]
    RedirectLimitReached,
}

impl Error {
    /// Negative integer code for this failure kind.
    pub fn code(&self) -> i32 {
        match self {
            Error::ConnectionRefused => -1,
            Error::SendHeaderFailed => -2,
            Error::SendPayloadFailed => -3,
            Error::NotConnected => -4,
            Error::ConnectionLost => -5,
            Error::NoBodySink => -6,
            Error::NoHttpServer => -7,
            Error::InsufficientMemory => -8,
            Error::UnsupportedEncoding => -9,
            Error::StreamWriteFailed => -10,
            Error::ReadTimeout => -11,
            Error::FetchHeadersFailed => -12,
            Error::ClientConfigError => -13,
            Error::RedirectLimitReached => -14,
        }
    }

    /// Look up the failure kind for a negative code.
    pub fn from_code(code: i32) -> Option<Error> {
        match code {
            -1 => Some(Error::ConnectionRefused),
            -2 => Some(Error::SendHeaderFailed),
            -3 => Some(Error::SendPayloadFailed),
            -4 => Some(Error::NotConnected),
            -5 => Some(Error::ConnectionLost),
            -6 => Some(Error::NoBodySink),
            -7 => Some(Error::NoHttpServer),
            -8 => Some(Error::InsufficientMemory),
            -9 => Some(Error::UnsupportedEncoding),
            -10 => Some(Error::StreamWriteFailed),
            -11 => Some(Error::ReadTimeout),
            -12 => Some(Error::FetchHeadersFailed),
            -13 => Some(Error::ClientConfigError),
            -14 => Some(Error::RedirectLimitReached),
            _ => None,
        }
    }
}

/// Map a negative error code to human-readable text.
///
/// Unknown codes map to an empty string.
pub fn error_to_string(code: i32) -> &'static str {
    match Error::from_code(code) {
        Some(Error::ConnectionRefused) => "connection refused",
        Some(Error::SendHeaderFailed) => "send header failed",
        Some(Error::SendPayloadFailed) => "send payload failed",
        Some(Error::NotConnected) => "not connected",
        Some(Error::ConnectionLost) => "connection lost",
        Some(Error::NoBodySink) => "no body sink",
        Some(Error::NoHttpServer) => "no HTTP server",
        Some(Error::InsufficientMemory) => "not enough memory",
        Some(Error::UnsupportedEncoding) => "Transfer-Encoding not supported",
        Some(Error::StreamWriteFailed) => "stream write error",
        Some(Error::ReadTimeout) => "read timeout",
        Some(Error::FetchHeadersFailed) => "fetch headers error",
        Some(Error::ClientConfigError) => "client configuration error",
        Some(Error::RedirectLimitReached) => "redirect limit reached",
        None => "",
    }
}

/// Default timeout for connect and per-operation transport waits
pub const DEFAULT_TCP_TIMEOUT_MS: u64 = 5000;

/// Receive-side transfer buffer size
pub const RX_BUFFER_SIZE: usize = 4096;

/// Transmit-side transfer buffer size
pub const TX_BUFFER_SIZE: usize = 1460;

/// Maximum number of captured response headers per exchange
pub const MAX_HEADERS: usize = 64;

/// Default HTTP and HTTPS ports
pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
