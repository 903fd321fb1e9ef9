//! Fixed-size flush buffer backing the worksheet XML stream
//!
//! The buffer is allocated once per worksheet and is the only allocation on
//! the row-writing path. Writers must prove a fragment fits (via
//! [`Buffer::remaining`]) before committing bytes; a fragment that does not
//! fit is signalled with a `false` return upstream, the caller flushes, and
//! the write resumes. [`MIN_BUFFER_SIZE`] guarantees that the longest atomic
//! fragment always fits in an empty buffer, so the resume path can always
//! make forward progress.

use crate::error::{Result, XlsxError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Smallest allowed buffer. Large enough for the worst-case row start tag,
/// any cell start element (including a maximum style id), any end element,
/// and at least one escaped character of a streamed value.
pub const MIN_BUFFER_SIZE: usize = 512;

/// Cooperative cancellation flag, checked at every flush boundary.
///
/// Cloning shares the flag. Once [`CancelToken::cancel`] has been called,
/// the next flush fails with [`XlsxError::Cancelled`] and the worksheet
/// must be abandoned; partially flushed output is not rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Byte buffer with a write cursor, flushed to an output sink when full
pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
    cancel: Option<CancelToken>,
}

impl Buffer {
    /// Create a buffer of `size` bytes, clamped up to [`MIN_BUFFER_SIZE`]
    pub fn new(size: usize) -> Self {
        Buffer {
            data: vec![0u8; size.max(MIN_BUFFER_SIZE)].into_boxed_slice(),
            len: 0,
            cancel: None,
        }
    }

    /// Create a buffer whose flushes observe `token`
    pub fn with_cancel(size: usize, token: CancelToken) -> Self {
        let mut buf = Self::new(size);
        buf.cancel = Some(token);
        buf
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes committed and not yet flushed
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available before a flush is required
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Mutable view of the unwritten tail, starting at the cursor
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Commit `n` bytes previously written into [`Buffer::writable`]
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining());
        self.len += n;
    }

    /// Copy `bytes` into the buffer. The caller must have proven capacity.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.remaining());
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Copy `bytes` only if they fit; returns false (and writes nothing)
    /// otherwise
    #[inline]
    pub fn try_extend(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.extend(bytes);
        true
    }

    /// Write all committed bytes to `sink` and reset the cursor.
    ///
    /// A no-op when the buffer is empty. Checks the cancellation token
    /// before touching the sink.
    pub fn flush<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(XlsxError::Cancelled);
            }
        }
        if self.len > 0 {
            sink.write_all(&self.data[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_size_enforced() {
        let buf = Buffer::new(1);
        assert_eq!(buf.capacity(), MIN_BUFFER_SIZE);

        let buf = Buffer::new(4096);
        assert_eq!(buf.capacity(), 4096);
    }

    #[test]
    fn test_extend_and_flush() {
        let mut buf = Buffer::new(512);
        buf.extend(b"hello ");
        buf.extend(b"world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.remaining(), 512 - 11);

        let mut out = Vec::new();
        buf.flush(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.remaining(), 512);

        // Empty flush is a no-op
        buf.flush(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_writable_advance() {
        let mut buf = Buffer::new(512);
        let dst = buf.writable();
        dst[..3].copy_from_slice(b"abc");
        buf.advance(3);

        let mut out = Vec::new();
        buf.flush(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_cancelled_flush() {
        let token = CancelToken::new();
        let mut buf = Buffer::with_cancel(512, token.clone());
        buf.extend(b"data");

        let mut out = Vec::new();
        buf.flush(&mut out).unwrap();

        buf.extend(b"more");
        token.cancel();
        assert!(matches!(buf.flush(&mut out), Err(XlsxError::Cancelled)));
        // Nothing further reached the sink
        assert_eq!(out, b"data");
    }
}
