//! Socket establishment
//!
//! Connects a TCP stream to a host with a bounded connect timeout and
//! applies the configured keep-alive options. Everything above this
//! module talks to the socket through the session operations layer.

use socket2::{Domain, Socket, TcpKeepalive, Type};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, Error>;

/// Socket establishment errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve host: {0}")]
    Resolve(String),

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),
}

/// TCP keep-alive options applied to every established connection.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub enabled: bool,
    pub idle: Duration,
    pub interval: Duration,
    pub count: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        KeepAlive {
            enabled: true,
            idle: Duration::from_millis(5000),
            interval: Duration::from_millis(5000),
            count: 5,
        }
    }
}

/// Connect to `host:port` within `timeout`.
///
/// Resolves the host, connects the first address with a bounded wait
/// and applies keep-alive and `TCP_NODELAY` before handing the stream
/// to the session layer.
pub fn connect(host: &str, port: u16, timeout: Duration, keep_alive: &KeepAlive) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(host.to_string()))?
        .next()
        .ok_or_else(|| Error::Resolve(host.to_string()))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;

    socket.connect_timeout(&addr.into(), timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock {
            Error::ConnectTimeout(addr)
        } else {
            Error::Io(e)
        }
    })?;

    if keep_alive.enabled {
        let options = TcpKeepalive::new()
            .with_time(keep_alive.idle)
            .with_interval(keep_alive.interval)
            .with_retries(keep_alive.count);
        socket.set_tcp_keepalive(&options)?;
    }
    socket.set_nodelay(true)?;

    Ok(socket.into())
}
