//! Peekable readers for sniff-then-decode workflows.
//!
//! Thin convenience wrapper around standard library I/O primitives
//! ([`Read::take`], [`Cursor`], [`Chain`]) so a decoder can look at the
//! header of a source, decide whether it wants it, and then consume the
//! whole stream without re-opening it.

use crate::error::{ErrorKind, Result};
use crate::{ImageFormat, SNIFF_LEN};
use exn::ResultExt;
use std::io::{Chain, Cursor, Read, Write};

/// A resumable [`Read`]er for peek-decide-stream workflows.
pub struct PeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes from the start of the source.
    ///
    /// Returns a slice of the buffered data. Successive calls do not
    /// accumulate:
    /// - `peek(16)` buffers 16 bytes, returns 16 bytes
    /// - `peek(64)` buffers an additional 48 bytes, returns 64 bytes
    /// - `peek(8)` immediately returns 8 bytes (the buffer already has 64)
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.inner).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Access data read into internal buffer so far.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    /// Convert into a [`Read`]er that replays the buffered head, then
    /// streams the rest of the source.
    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.inner)
    }

    /// Read all remaining data and return the complete buffer.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.inner.read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(self.buffer)
    }

    /// Stream all data (buffered plus unbuffered) into `writer`.
    pub fn copy_into<W: Write>(self, writer: &mut W) -> Result<u64> {
        std::io::copy(&mut self.into_reader(), writer).or_raise(|| ErrorKind::Io)
    }
}

impl ImageFormat {
    /// Sniff the format of a reader without losing any of its bytes.
    ///
    /// Peeks [`SNIFF_LEN`] bytes and runs magic-byte detection over them; the
    /// returned [`PeekableReader`] still yields the complete stream.
    ///
    /// # Example
    ///
    /// ```
    /// use sketch_image::ImageFormat;
    /// use std::io::Cursor;
    ///
    /// let data = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
    /// let (format, peekable) = ImageFormat::sniff(Cursor::new(data.clone())).unwrap();
    /// assert_eq!(format, ImageFormat::Gif);
    /// assert_eq!(peekable.into_bytes().unwrap(), data);
    /// ```
    pub fn sniff<R: Read>(reader: R) -> Result<(Self, PeekableReader<R>)> {
        let mut peekable = PeekableReader::new(reader);
        let format = ImageFormat::from_magic_bytes(peekable.peek(SNIFF_LEN)?);
        tracing::trace!(format = %format, "sniffed image header");
        Ok((format, peekable))
    }
}
