//! Request-decode scratch reader.

use bytes::{Buf, BytesMut};

use crate::pool::object_pool::{Reusable, MAX_RETAINED_CAPACITY};

/// Accumulates raw bytes read from a connection until a full request is framed.
///
/// Bytes belonging to a following request stay buffered after
/// [`consume`](Self::consume).
#[derive(Debug, Default)]
pub struct ScratchReader {
    buf: BytesMut,
}

impl ScratchReader {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Everything read but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Drop the first `len` buffered bytes.
    pub fn consume(&mut self, len: usize) {
        self.buf.advance(len.min(self.buf.len()));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Reusable for ScratchReader {
    fn reset(&mut self) {
        self.buf.clear();
    }

    fn is_reusable(&self) -> bool {
        self.buf.capacity() <= MAX_RETAINED_CAPACITY
    }
}
