//! Fixed-capacity byte ring buffer.
//!
//! The buffer keeps one slot free to tell "full" apart from "empty", so a
//! buffer of capacity `N` holds at most `N - 1` bytes. Writes that do not fit
//! are truncated; the overflow is counted rather than reported as an error.

/// Smallest usable capacity (one data byte plus the sentinel slot).
pub const MIN_CAPACITY: usize = 2;

/// Largest capacity addressable with 16-bit indices.
pub const MAX_CAPACITY: usize = 65_536;

/// A byte ring buffer with a single writer position and a single reader
/// position.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    head: usize,
    tail: usize,
    dropped: u64,
}

impl RingBuffer {
    /// Create an empty ring buffer.
    ///
    /// `capacity` is clamped to `MIN_CAPACITY..=MAX_CAPACITY`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            dropped: 0,
        }
    }

    /// Total slots, including the sentinel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of pending bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.capacity() - self.tail + self.head
        }
    }

    /// Whether no bytes are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Whether another byte would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.next(self.head) == self.tail
    }

    /// Bytes that can still be written.
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - 1 - self.len()
    }

    /// Bytes rejected because the buffer was full, since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Append as many bytes as fit, returning how many were accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        for &byte in data {
            let next = self.next(self.head);
            if next == self.tail {
                break;
            }
            self.storage[self.head] = byte;
            self.head = next;
            written += 1;
        }
        self.dropped += (data.len() - written) as u64;
        written
    }

    /// Pending bytes that are stored contiguously starting at the read
    /// position.
    ///
    /// When the data wraps, this stops at the end of storage; the remainder is
    /// returned by the next call after [`consume`](Self::consume).
    #[must_use]
    pub fn contiguous(&self) -> &[u8] {
        let end = if self.head >= self.tail {
            self.head
        } else {
            self.capacity()
        };
        &self.storage[self.tail..end]
    }

    /// Release `n` bytes from the read position.
    ///
    /// Never advances past the write position.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len());
        self.tail = (self.tail + n) % self.capacity();
    }

    /// Discard all pending bytes. The overflow counter is kept.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    fn next(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }
}
