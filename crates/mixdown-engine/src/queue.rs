//! Per-track sample queue between track reads and the resampler.
//!
//! Reads from a track arrive in large irregular runs while the resampler
//! consumes fixed-size chunks. The queue holds the unread run as a
//! contiguous slice `[start, start + len)` of a fixed buffer; refills
//! first compact the unread part to offset zero and then append.

use mixdown_core::limits::QUEUE_MAX_LEN;

/// Bounded contiguous queue of `f32` samples.
pub struct SampleQueue {
    buffer: Box<[f32]>,
    start: usize,
    len: usize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0f32; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of samples waiting to be consumed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the first unread sample.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Room left for appending after a [`compact`](Self::compact).
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len
    }

    /// Move the unread samples to the front of the buffer.
    pub fn compact(&mut self) {
        if self.start > 0 {
            self.buffer.copy_within(self.start..self.start + self.len, 0);
            self.start = 0;
        }
    }

    /// Writable tail of `count` samples directly after the unread part.
    ///
    /// The samples become readable after [`commit`](Self::commit).
    pub fn tail_mut(&mut self, count: usize) -> &mut [f32] {
        let begin = self.start + self.len;
        assert!(
            begin + count <= self.capacity(),
            "sample queue overflow: {} + {} > {}",
            begin,
            count,
            self.capacity()
        );
        &mut self.buffer[begin..begin + count]
    }

    /// Make `count` samples written through [`tail_mut`](Self::tail_mut) readable.
    pub fn commit(&mut self, count: usize) {
        assert!(self.start + self.len + count <= self.capacity());
        self.len += count;
    }

    /// The unread samples.
    pub fn pending(&self) -> &[f32] {
        &self.buffer[self.start..self.start + self.len]
    }

    /// Drop `count` samples from the front.
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.len, "sample queue underflow");
        self.start += count;
        self.len -= count;
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new(QUEUE_MAX_LEN)
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
