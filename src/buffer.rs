//! Byte buffers owned by queue entries.
//!
//! Every record and handshake message held by the [`Buffers`](crate::Buffers)
//! owns exactly one [`Buf`]. When an entry is released its buffer goes back to
//! a [`BufferPool`] so the next datagram can reuse the allocation.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::Error;

/// Pool of released buffers.
#[derive(Default)]
pub struct BufferPool {
    free: VecDeque<Buf>,
    max_free: usize,
}

impl BufferPool {
    /// Create a pool with room for `max_free` idle buffers.
    ///
    /// The bookkeeping is reserved up front so a failure surfaces here and not
    /// in the middle of a handshake.
    pub fn with_capacity(max_free: usize) -> Result<Self, Error> {
        let mut free = VecDeque::new();
        free.try_reserve_exact(max_free)
            .map_err(|_| Error::AllocationFailure)?;
        Ok(Self { free, max_free })
    }

    /// Take a Buffer from the pool.
    ///
    /// Creates a new buffer if none is free.
    pub fn pop(&mut self) -> Buf {
        self.free.pop_front().unwrap_or_default()
    }

    /// Return a buffer to the pool.
    ///
    /// Buffers beyond the pool's capacity are dropped.
    pub fn push(&mut self, mut buffer: Buf) {
        if self.free.len() >= self.max_free {
            return;
        }
        buffer.clear();
        self.free.push_front(buffer);
    }

    /// Number of idle buffers.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Drop every idle buffer.
    pub fn release_all(&mut self) {
        self.free.clear();
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("free", &self.free.len())
            .finish()
    }
}

/// Growable byte buffer.
///
/// The Debug output only shows the length, never the content.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Buf(Vec<u8>);

impl Buf {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new buffer from a slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Buf(data.to_vec())
    }

    /// Create a zero filled buffer of `len` bytes.
    ///
    /// Fails instead of aborting when the allocation cannot be made.
    pub fn try_zeroed(len: usize) -> Result<Self, Error> {
        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailure)?;
        v.resize(len, 0);
        Ok(Buf(v))
    }

    /// Clear the buffer, removing all data.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Extend the buffer with a slice of bytes.
    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    /// Push a single byte onto the buffer.
    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// Trait for types that can be converted into a `Buf`.
pub trait ToBuf {
    /// Convert this value into a `Buf`.
    fn to_buf(self) -> Buf;
}

impl ToBuf for Vec<u8> {
    fn to_buf(self) -> Buf {
        Buf(self)
    }
}

impl ToBuf for &[u8] {
    fn to_buf(self) -> Buf {
        self.to_vec().to_buf()
    }
}
