//! TLS session operations
//!
//! Client-side TLS transport implementing the `SessionOps` trait over
//! an OpenSSL stream. Trust comes either from a caller-supplied PEM
//! anchor (plus optional client certificate for mutual TLS) or from
//! the platform's default verify paths.

use super::session::{io_error, poll_fd, PollEvents, SessionOps};
use super::{Error, Result as HttpResult};
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::X509;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Trust configuration for an outgoing TLS connection.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM trust anchor; platform default paths when absent
    pub ca_cert_pem: Option<String>,
    /// Client certificate PEM for mutual TLS
    pub client_cert_pem: Option<String>,
    /// Client private key PEM for mutual TLS
    pub client_key_pem: Option<String>,
}

/// TLS session operations
///
/// Wraps an OpenSSL stream and provides poll/read/write/close in terms
/// of the engine's closed error set.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    /// Perform the client handshake against `host` over an established
    /// TCP stream.
    pub fn connect(
        tcp_stream: TcpStream,
        host: &str,
        options: &TlsOptions,
    ) -> std::result::Result<Self, TlsError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        if let Some(ref pem) = options.ca_cert_pem {
            let anchor = X509::from_pem(pem.as_bytes())
                .map_err(|e| TlsError::Certificate(format!("invalid trust anchor: {}", e)))?;
            builder.cert_store_mut().add_cert(anchor)?;
        }
        builder.set_verify(SslVerifyMode::PEER);

        if let (Some(cert), Some(key)) = (&options.client_cert_pem, &options.client_key_pem) {
            let cert = X509::from_pem(cert.as_bytes())
                .map_err(|e| TlsError::Certificate(format!("invalid client cert: {}", e)))?;
            let key = PKey::private_key_from_pem(key.as_bytes())
                .map_err(|e| TlsError::Certificate(format!("invalid client key: {}", e)))?;
            builder.set_certificate(&cert)?;
            builder.set_private_key(&key)?;
            builder.check_private_key()?;
        }

        // connect() sets SNI and verifies the hostname against the peer
        // certificate.
        let connector = builder.build();
        let ssl_stream = connector
            .connect(host, tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;

        Ok(TlsSessionOps {
            stream: ssl_stream,
            failed: false,
        })
    }

    /// Whether a transport failure was observed on this session
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Get a reference to the underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Buffered TLS records count as readable.
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }
        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.failed = true;
                Err(io_error(&e))
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        match self.stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.failed = true;
                Err(io_error(&e))
            }
        }
    }

    fn close(&mut self) -> HttpResult<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        use std::net::Shutdown;
        self.stream
            .get_mut()
            .shutdown(Shutdown::Both)
            .map_err(|_| Error::ConnectionLost)
    }
}
