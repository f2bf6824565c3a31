//! Uniform "ensure at least `k` bytes are available" contract over a file,
//! a socket, or an in-memory buffer.
//!
//! The file variant is built directly on `buf_redux::BufReader<R,
//! MinBuffered>`, the same growable-buffer reader pcarp's `BlockReader` uses:
//! `fill_buf` to see what's there, `consume` to release bytes the caller has
//! finished with. The adapter never consumes past what the decoder confirms
//! it has used, so a failed ensure leaves the buffer untouched for a retry
//! once more bytes arrive.

use std::io::{self, ErrorKind, Read};

use buf_redux::policy::MinBuffered;
use buf_redux::BufReader;
use bytes::Bytes;

use crate::error::{Error, Result};

pub(crate) const DEFAULT_MIN_BUFFERED: usize = 8 * 1024;

/// Presents a byte source as a buffer the decoder can ensure has grown to at
/// least `k` bytes before reading past the current high-water mark.
pub trait StreamAdapter {
    /// Guarantee that `self.available()` returns at least `n` bytes, reading
    /// more from the underlying source as needed. Returns `Ok(())` even if
    /// fewer than `n` bytes could ever be produced (clean EOF) — callers
    /// distinguish that case by checking `available().len()` afterward.
    fn ensure(&mut self, n: usize) -> Result<()>;

    /// The bytes currently buffered, starting at the current read position.
    fn available(&self) -> &[u8];

    /// Release the first `n` bytes of `available()`; they will not be
    /// returned by `available()` again.
    fn consume(&mut self, n: usize);

    /// True once the underlying source has reported clean EOF and no more
    /// bytes remain buffered.
    fn is_exhausted(&self) -> bool;
}

/// A seekable-or-not `Read` source wrapped in a growable buffer, for files
/// and other local byte sources.
pub struct FileStreamAdapter<R> {
    rdr: BufReader<R, MinBuffered>,
    eof: bool,
}

impl<R: Read> FileStreamAdapter<R> {
    pub fn new(rdr: R) -> FileStreamAdapter<R> {
        Self::with_capacity(rdr, DEFAULT_MIN_BUFFERED)
    }

    pub fn with_capacity(rdr: R, min_buffered: usize) -> FileStreamAdapter<R> {
        let rdr = BufReader::new(rdr).set_policy(MinBuffered(min_buffered));
        FileStreamAdapter { rdr, eof: false }
    }
}

impl<R: Read> StreamAdapter for FileStreamAdapter<R> {
    fn ensure(&mut self, n: usize) -> Result<()> {
        use std::io::BufRead;
        loop {
            let buf_len = self.rdr.buffer().len();
            if buf_len >= n || self.eof {
                return Ok(());
            }
            let before = self.rdr.buffer().len();
            let filled = self.rdr.fill_buf()?;
            if filled.len() == before {
                self.eof = true;
                return Ok(());
            }
        }
    }

    fn available(&self) -> &[u8] {
        self.rdr.buffer()
    }

    fn consume(&mut self, n: usize) {
        use std::io::BufRead;
        self.rdr.consume(n);
    }

    fn is_exhausted(&self) -> bool {
        self.eof && self.rdr.buffer().is_empty()
    }
}

/// A possibly-blocking, non-seekable source (e.g. a `TcpStream`). A
/// `WouldBlock`/`TimedOut` error surfaces as [`Error::Timeout`] instead of
/// propagating as plain I/O, so the generator can distinguish "no data yet"
/// from a genuine stream failure.
pub struct SocketStreamAdapter<R> {
    rdr: BufReader<R, MinBuffered>,
    eof: bool,
}

impl<R: Read> SocketStreamAdapter<R> {
    pub fn new(rdr: R) -> SocketStreamAdapter<R> {
        Self::with_capacity(rdr, DEFAULT_MIN_BUFFERED)
    }

    pub fn with_capacity(rdr: R, min_buffered: usize) -> SocketStreamAdapter<R> {
        let rdr = BufReader::new(rdr).set_policy(MinBuffered(min_buffered));
        SocketStreamAdapter { rdr, eof: false }
    }
}

impl<R: Read> StreamAdapter for SocketStreamAdapter<R> {
    fn ensure(&mut self, n: usize) -> Result<()> {
        use std::io::BufRead;
        loop {
            let buf_len = self.rdr.buffer().len();
            if buf_len >= n || self.eof {
                return Ok(());
            }
            let before = self.rdr.buffer().len();
            match self.rdr.fill_buf() {
                Ok(filled) if filled.len() == before => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => return Err(classify_io_error(e)),
            }
        }
    }

    fn available(&self) -> &[u8] {
        self.rdr.buffer()
    }

    fn consume(&mut self, n: usize) {
        use std::io::BufRead;
        self.rdr.consume(n);
    }

    fn is_exhausted(&self) -> bool {
        self.eof && self.rdr.buffer().is_empty()
    }
}

/// An in-memory source, used throughout the test suite and by the
/// read-directly-from-a-byte-buffer runtime API entry point. `ensure` never
/// blocks: everything is already available, or it never will be.
pub struct SliceStreamAdapter {
    buf: Bytes,
    pos: usize,
}

impl SliceStreamAdapter {
    pub fn new(buf: impl Into<Bytes>) -> SliceStreamAdapter {
        SliceStreamAdapter {
            buf: buf.into(),
            pos: 0,
        }
    }
}

impl StreamAdapter for SliceStreamAdapter {
    fn ensure(&mut self, _n: usize) -> Result<()> {
        Ok(())
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

/// Maps a raw I/O error from a non-blocking read to [`Error::Timeout`] where
/// applicable; otherwise wraps it as [`Error::Io`].
pub(crate) fn classify_io_error(e: io::Error) -> Error {
    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
        Error::Timeout
    } else {
        Error::Io(e)
    }
}
