//! Session operations abstraction
//!
//! This module provides the session operations pattern that allows
//! transparent switching between plain TCP and TLS connections.
//!
//! Transport failures are folded into the engine's closed error set at
//! this layer: readiness timeouts become `ReadTimeout`, everything else
//! becomes `ConnectionLost`.

use super::tls::TlsSessionOps;
use super::{Error, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Session operations trait
///
/// Defines the operations performed on an established transport,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps {
    /// Wait for the transport to become ready for the requested
    /// operation. Returns false when the timeout expires first.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the transport
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the transport
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the transport
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Map an I/O failure onto the closed error set.
pub(crate) fn io_error(e: &std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::ReadTimeout,
        _ => Error::ConnectionLost,
    }
}

/// poll(2) the raw fd for readiness within the timeout.
pub(crate) fn poll_fd(fd: i32, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout.map(|d| d.as_millis() as i32).unwrap_or(-1);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(Error::ConnectionLost);
    }

    Ok(result > 0)
}

/// HTTP session wrapping a transport with session operations
///
/// Applies the configured timeout to every read and write by polling
/// for readiness first, so a stalled server surfaces as `ReadTimeout`
/// instead of blocking forever.
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new HTTP session
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(Duration::from_millis(super::DEFAULT_TCP_TIMEOUT_MS)),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::ReadTimeout);
        }
        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Write, self.timeout)? {
            return Err(Error::ReadTimeout);
        }
        self.session.write(buf)
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn get_ref(&self) -> &S {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(|e| io_error(&e))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(|e| io_error(&e))
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        // Peer may already have closed; nothing to report either way.
        let _ = self.stream.shutdown(Shutdown::Both);
        Ok(())
    }
}

/// Established transport to one host, plain or TLS.
pub enum Transport {
    Plain(FdSessionOps),
    Tls(TlsSessionOps),
}

impl SessionOps for Transport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        match self {
            Transport::Plain(s) => s.poll(events, timeout),
            Transport::Tls(s) => s.poll(events, timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(s) => s.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(s) => s.write(buf),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Transport::Plain(s) => s.close(),
            Transport::Tls(s) => s.close(),
        }
    }
}

/// Helper to create an HTTP session from a plain TCP stream
pub fn from_tcp_stream(stream: TcpStream) -> HttpSession<Transport> {
    HttpSession::new(Transport::Plain(FdSessionOps::new(stream)))
}
