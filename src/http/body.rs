//! Response body decoding
//!
//! Stateful byte-level reader over the response body of the current
//! exchange. The body is either a `Content-Length`-bounded block, an
//! unknown-length stream terminated by connection close, or a chunked
//! transfer-encoded stream whose framing (size lines, per-chunk CRLF
//! terminators, final trailer) is consumed here so that callers only
//! ever see payload bytes.
//!
//! The reader holds at most one pre-fetched byte for `peek`; a read
//! drains that slot before touching the transport again. Bytes the
//! header parser over-read are handed in at construction and served
//! first.

use super::session::{HttpSession, SessionOps};
use super::transfer::alloc_buffer;
use super::{Error, Result, RX_BUFFER_SIZE};
use bytes::{Buf, BytesMut};
use log::{debug, trace};
use std::time::Duration;

/// Longest accepted chunk-size line, extensions included
const CHUNK_LINE_LIMIT: usize = 128;

/// Pause before the single retry after a short sink write
const SHORT_WRITE_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Body is bounded by the declared length (or runs to connection
    /// close when the length is unknown)
    FixedLength,
    /// Next transport bytes are a chunk-size line
    ChunkedAwaitingHeader,
    /// Inside a chunk's payload
    ChunkedInBody,
    /// Body fully consumed; reads and peeks report no data
    Finished,
}

/// Decoding cursor over one response body.
pub struct BodyReader {
    state: DecodeState,
    chunked: bool,
    /// Declared body length; -1 when unknown
    declared: i64,
    /// Payload bytes pulled so far in fixed-length mode
    consumed: i64,
    /// Declared size of the current chunk
    chunk_size: usize,
    /// Payload bytes pulled from the current chunk
    chunk_consumed: usize,
    /// No chunk-data CRLF precedes the first chunk-size line
    first_chunk: bool,
    /// One-byte lookahead slot filled by `peek`
    peeked: Option<u8>,
    /// Bytes the header parser read past the header block
    pending: BytesMut,
}

impl BodyReader {
    /// Create the decode cursor for a response.
    ///
    /// `pending` holds any body bytes that arrived together with the
    /// header block; they are drained before the transport is read.
    pub fn new(chunked: bool, declared: i64, pending: BytesMut) -> Self {
        BodyReader {
            state: if chunked {
                DecodeState::ChunkedAwaitingHeader
            } else if declared == 0 {
                DecodeState::Finished
            } else {
                DecodeState::FixedLength
            },
            chunked,
            declared: if chunked { -1 } else { declared },
            consumed: 0,
            chunk_size: 0,
            chunk_consumed: 0,
            first_chunk: true,
            peeked: None,
            pending,
        }
    }

    /// Whether the body uses chunked transfer-encoding
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Whether the body has been fully consumed
    pub fn is_finished(&self) -> bool {
        self.state == DecodeState::Finished
    }

    /// Declared size of the current chunk
    pub fn current_chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes already pulled from the current chunk
    pub fn current_chunk_consumed(&self) -> usize {
        self.chunk_consumed
    }

    /// Bytes left in the current chunk
    pub fn current_chunk_remaining(&self) -> usize {
        self.chunk_size - self.chunk_consumed
    }

    /// Bytes that can be read without exhausting the current framing
    /// unit.
    ///
    /// Fixed-length mode reports the unread remainder of the declared
    /// length; chunked mode reports the remainder of the current chunk,
    /// fetching the next chunk-size line first when the current one is
    /// spent. A held peek byte counts. Zero once the body is finished.
    pub fn available<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> usize {
        let ahead = usize::from(self.peeked.is_some());

        match self.state {
            DecodeState::Finished => ahead,
            DecodeState::FixedLength => {
                if self.declared < 0 {
                    ahead + self.pending.len()
                } else {
                    ahead + (self.declared - self.consumed).max(0) as usize
                }
            }
            _ => match self.ensure_chunk_data(session) {
                Ok(true) => ahead + (self.chunk_size - self.chunk_consumed),
                Ok(false) => ahead,
                Err(e) => {
                    debug!("chunk header fetch failed: {}", e);
                    ahead
                }
            },
        }
    }

    /// Look at the next body byte without consuming it.
    ///
    /// The byte is pulled into the lookahead slot (fetching the next
    /// chunk header first when the current chunk is spent, so the chunk
    /// cursor advances exactly once) and returned again by the next
    /// `read`. Returns `None` once the body is exhausted.
    pub fn peek<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<Option<u8>> {
        if let Some(byte) = self.peeked {
            return Ok(Some(byte));
        }

        let mut byte = [0u8; 1];
        match self.state {
            DecodeState::Finished => return Ok(None),
            DecodeState::FixedLength => {
                if self.declared >= 0 && self.consumed >= self.declared {
                    return Ok(None);
                }
                let n = self.fill(session, &mut byte)?;
                if n == 0 {
                    if self.declared < 0 {
                        self.state = DecodeState::Finished;
                    }
                    return Ok(None);
                }
                self.consumed += 1;
            }
            _ => {
                if !self.ensure_chunk_data(session)? {
                    return Ok(None);
                }
                self.fill_exact(session, &mut byte)?;
                self.chunk_consumed += 1;
            }
        }

        self.peeked = Some(byte[0]);
        Ok(Some(byte[0]))
    }

    /// Read body bytes into `buf`.
    ///
    /// Drains the lookahead slot first. In chunked mode the read
    /// crosses chunk boundaries transparently, fetching size lines and
    /// validating terminators internally, until the buffer is full or
    /// the body ends. Returns the byte count; 0 means the body is
    /// exhausted.
    pub fn read<S: SessionOps>(
        &mut self,
        session: &mut HttpSession<S>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut count = 0;
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            count = 1;
        }

        match self.state {
            DecodeState::Finished => {}
            DecodeState::FixedLength => {
                let mut want = buf.len() - count;
                if self.declared >= 0 {
                    want = want.min((self.declared - self.consumed) as usize);
                }
                if want > 0 {
                    let n = self.fill(session, &mut buf[count..count + want])?;
                    if n == 0 && self.declared < 0 {
                        self.state = DecodeState::Finished;
                    }
                    self.consumed += n as i64;
                    count += n;
                }
            }
            _ => {
                while count < buf.len() {
                    if !self.ensure_chunk_data(session)? {
                        break;
                    }
                    let want = (buf.len() - count).min(self.chunk_size - self.chunk_consumed);
                    let n = self.fill(session, &mut buf[count..count + want])?;
                    if n == 0 {
                        return Err(Error::ConnectionLost);
                    }
                    self.chunk_consumed += n;
                    count += n;
                }
            }
        }

        Ok(count)
    }

    /// Read a single body byte
    pub fn read_byte<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        if self.read(session, &mut byte)? == 1 {
            Ok(Some(byte[0]))
        } else {
            Ok(None)
        }
    }

    /// Copy the whole remaining body to a sink.
    ///
    /// Reads in bounded blocks; a short sink write is retried exactly
    /// once after a brief pause and a second short result fails with
    /// `StreamWriteFailed`. When the declared length is known, the
    /// total forwarded must match it.
    pub fn copy_to<S, W>(&mut self, session: &mut HttpSession<S>, sink: &mut W) -> Result<i64>
    where
        S: SessionOps,
        W: std::io::Write + ?Sized,
    {
        // Anything already handed to the caller no longer counts.
        let expected = if self.declared >= 0 {
            Some(self.declared - self.consumed + i64::from(self.peeked.is_some()))
        } else {
            None
        };

        let mut buf = alloc_buffer(RX_BUFFER_SIZE)?;
        let mut total: i64 = 0;

        loop {
            let n = self.read(session, &mut buf)?;
            if n == 0 {
                break;
            }
            forward(sink, &buf[..n])?;
            total += n as i64;
        }

        if let Some(expected) = expected {
            if total != expected {
                debug!("body copy wrote {} of expected {}", total, expected);
                return Err(Error::StreamWriteFailed);
            }
        }
        Ok(total)
    }

    /// Read and discard whatever is left of the body.
    pub fn discard<S: SessionOps>(&mut self, session: &mut HttpSession<S>) {
        let mut buf = [0u8; 256];
        loop {
            match self.read(session, &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    /// Serve buffered bytes before touching the transport.
    fn fill<S: SessionOps>(
        &mut self,
        session: &mut HttpSession<S>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            return Ok(n);
        }
        session.read(buf)
    }

    fn fill_exact<S: SessionOps>(
        &mut self,
        session: &mut HttpSession<S>,
        buf: &mut [u8],
    ) -> Result<()> {
        let mut off = 0;
        while off < buf.len() {
            let n = self.fill(session, &mut buf[off..])?;
            if n == 0 {
                return Err(Error::ConnectionLost);
            }
            off += n;
        }
        Ok(())
    }

    /// Read one CRLF-terminated framing line.
    fn read_line<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<String> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.fill_exact(session, &mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > CHUNK_LINE_LIMIT {
                return Err(Error::ReadTimeout);
            }
        }
        if line.pop() != Some(b'\r') {
            return Err(Error::ReadTimeout);
        }
        Ok(String::from_utf8_lossy(&line).to_string())
    }

    /// Make sure the current chunk has unread payload, fetching the
    /// next chunk-size line when needed. False once all chunks are
    /// done.
    fn ensure_chunk_data<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<bool> {
        loop {
            match self.state {
                DecodeState::ChunkedInBody => {
                    if self.chunk_consumed < self.chunk_size {
                        return Ok(true);
                    }
                    self.state = DecodeState::ChunkedAwaitingHeader;
                }
                DecodeState::ChunkedAwaitingHeader => {
                    if !self.next_chunk_header(session)? {
                        return Ok(false);
                    }
                }
                DecodeState::Finished => return Ok(false),
                DecodeState::FixedLength => return Ok(false),
            }
        }
    }

    /// Consume the previous chunk's terminator and the next chunk-size
    /// line. False when the 0-size terminator chunk was reached.
    fn next_chunk_header<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<bool> {
        if !self.first_chunk {
            let mut terminator = [0u8; 2];
            self.fill_exact(session, &mut terminator)?;
            if &terminator != b"\r\n" {
                return Err(Error::ReadTimeout);
            }
        }
        self.first_chunk = false;

        let line = self.read_line(session)?;
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| Error::UnsupportedEncoding)?;
        trace!("chunk header: {} bytes", size);

        if size == 0 {
            self.consume_trailer(session)?;
            self.state = DecodeState::Finished;
            return Ok(false);
        }

        self.chunk_size = size;
        self.chunk_consumed = 0;
        self.state = DecodeState::ChunkedInBody;
        Ok(true)
    }

    /// Skip trailer header lines and validate the final empty line.
    fn consume_trailer<S: SessionOps>(&mut self, session: &mut HttpSession<S>) -> Result<()> {
        loop {
            let line = self.read_line(session)?;
            if line.is_empty() {
                return Ok(());
            }
            trace!("discarding trailer: {}", line);
        }
    }
}

/// Forward a block to the sink with the retry-once short-write policy.
fn forward<W: std::io::Write + ?Sized>(sink: &mut W, data: &[u8]) -> Result<()> {
    let n = sink.write(data).map_err(|_| Error::StreamWriteFailed)?;
    if n == data.len() {
        return Ok(());
    }

    debug!("short write, asked for {} but got {}, retry", data.len(), n);
    std::thread::sleep(SHORT_WRITE_DELAY);

    let left = &data[n..];
    let again = sink.write(left).map_err(|_| Error::StreamWriteFailed)?;
    if again != left.len() {
        debug!("short write, asked for {} but got {}, failed", left.len(), again);
        return Err(Error::StreamWriteFailed);
    }
    Ok(())
}
