//! Request body transmission
//!
//! Pushes a payload buffer or a generic byte source into the transport.
//! Transient zero-byte writes are retried a bounded number of times
//! with a short sleep in between; a transport error is immediately
//! fatal. A bounded-length send that ends short of the declared length
//! is fatal as well.

use super::session::{HttpSession, SessionOps};
use super::{Error, Result, TX_BUFFER_SIZE};
use log::{debug, warn};
use std::time::Duration;

/// Attempts allowed for a write that keeps accepting zero bytes
pub const WRITE_RETRY_LIMIT: usize = 3;

/// Pause between zero-byte write attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pause before the single retry after a short source-drain write
const SHORT_WRITE_DELAY: Duration = Duration::from_millis(1);

/// Generic byte source for streamed request bodies.
///
/// A source reports how many bytes it can currently hand over without
/// blocking and pulls up to a requested amount into a buffer.
pub trait BodySource {
    /// Bytes currently available to pull
    fn available(&self) -> usize;

    /// Pull up to `buf.len()` bytes; 0 means the source is exhausted
    fn pull(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<T: AsRef<[u8]>> BodySource for std::io::Cursor<T> {
    fn available(&self) -> usize {
        let len = self.get_ref().as_ref().len() as u64;
        len.saturating_sub(self.position()) as usize
    }

    fn pull(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        std::io::Read::read(self, buf)
    }
}

/// Allocate a transfer buffer, reporting failure instead of aborting.
pub(crate) fn alloc_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| {
        warn!("transfer buffer allocation failed, need {}", size);
        Error::InsufficientMemory
    })?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Push as much of `buf` as the transport accepts.
///
/// Zero-byte writes are treated as transient backpressure and retried
/// up to [`WRITE_RETRY_LIMIT`] times; any transport error is fatal.
/// May return a short count once the retry bound is exhausted.
fn push<S: SessionOps>(session: &mut HttpSession<S>, buf: &[u8]) -> Result<usize> {
    let mut sent = 0;
    let mut retries = 0;

    while sent < buf.len() && retries < WRITE_RETRY_LIMIT {
        match session.write(&buf[sent..]) {
            Err(e) => {
                warn!("payload write error: {}", e);
                return Err(Error::SendPayloadFailed);
            }
            Ok(0) => {
                retries += 1;
                warn!("zero-length write, retry {}/{}", retries, WRITE_RETRY_LIMIT);
                std::thread::sleep(RETRY_DELAY);
            }
            Ok(n) => {
                sent += n;
                retries = 0;
            }
        }
    }

    Ok(sent)
}

/// Transmit the whole buffer or fail.
pub fn send_buffer<S: SessionOps>(session: &mut HttpSession<S>, buf: &[u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }

    let sent = push(session, buf)?;
    if sent != buf.len() {
        warn!("incomplete payload: {}/{} bytes", sent, buf.len());
        return Err(Error::SendPayloadFailed);
    }
    Ok(sent)
}

/// Drain `size` bytes from a source into the transport in bounded
/// blocks.
///
/// A short block write is retried exactly once after a brief pause; a
/// second short result is fatal. The total transmitted must match the
/// declared size.
pub fn send_source<S: SessionOps>(
    session: &mut HttpSession<S>,
    source: &mut dyn BodySource,
    size: usize,
) -> Result<usize> {
    let block = TX_BUFFER_SIZE.min(size.max(1));
    let mut buf = alloc_buffer(block)?;
    let mut written = 0;

    while written < size {
        let mut want = (size - written).min(buf.len());
        let available = source.available();
        if available > 0 {
            want = want.min(available);
        }

        let pulled = source
            .pull(&mut buf[..want])
            .map_err(|_| Error::SendPayloadFailed)?;
        if pulled == 0 {
            break;
        }

        let sent = push(session, &buf[..pulled])?;
        if sent != pulled {
            debug!("short write, asked for {} but got {}, retry", pulled, sent);
            std::thread::sleep(SHORT_WRITE_DELAY);

            let left = pulled - sent;
            let sent_again = push(session, &buf[sent..pulled])?;
            if sent_again != left {
                debug!("short write, asked for {} but got {}, failed", left, sent_again);
                return Err(Error::SendPayloadFailed);
            }
        }

        written += pulled;
    }

    if written != size {
        warn!("source payload written {} and size {} mismatch", written, size);
        return Err(Error::SendPayloadFailed);
    }
    Ok(written)
}
