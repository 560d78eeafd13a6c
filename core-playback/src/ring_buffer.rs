//! # Ring Buffer for Sample Pairs
//!
//! Fixed-capacity FIFO of [`SamplePair`]s between the rate converter
//! (producer) and the player's `read` (consumer).
//!
//! ## Design
//!
//! - **Ownership**: Owned by one [`SampleRateConverter`](crate::resampler::SampleRateConverter);
//!   the player's lock serializes access, so no interior locking is needed.
//! - **Capacity**: Fixed size determined at creation.
//! - **Overflow Policy**: Never overwrites. `write` stores what fits and
//!   reports the count; the producer sizes its writes from [`free_space`](RingBuffer::free_space).
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::ring_buffer::RingBuffer;
//! use core_playback::SamplePair;
//!
//! let mut buffer = RingBuffer::new(4096);
//! buffer.write(&[SamplePair::new(100, -100), SamplePair::new(200, -200)]);
//!
//! let mut output = [SamplePair::SILENCE; 16];
//! let read = buffer.read(&mut output);
//! assert_eq!(read, 2);
//! ```

use crate::traits::SamplePair;
use tracing::error;

pub struct RingBuffer {
    buffer: Vec<SamplePair>,
    read_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a new ring buffer holding up to `capacity` pairs.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![SamplePair::SILENCE; capacity.max(1)],
            read_pos: 0,
            len: 0,
        }
    }

    /// Append pairs in order.
    ///
    /// Returns the number of pairs stored. Pairs beyond the free space are
    /// dropped; that only happens when the producer ignored `free_space`.
    pub fn write(&mut self, pairs: &[SamplePair]) -> usize {
        if pairs.is_empty() {
            return 0;
        }

        let to_write = pairs.len().min(self.free_space());
        if to_write < pairs.len() {
            error!(
                dropped = pairs.len() - to_write,
                capacity = self.capacity(),
                "Ring buffer overflow, producer wrote past free space"
            );
        }

        let capacity = self.capacity();
        let write_pos = (self.read_pos + self.len) % capacity;
        let first = to_write.min(capacity - write_pos);
        self.buffer[write_pos..write_pos + first].copy_from_slice(&pairs[..first]);
        self.buffer[..to_write - first].copy_from_slice(&pairs[first..to_write]);

        self.len += to_write;
        to_write
    }

    /// Append a single pair. Returns `false` if the buffer is full.
    pub fn push(&mut self, pair: SamplePair) -> bool {
        self.write(std::slice::from_ref(&pair)) == 1
    }

    /// Read pairs in FIFO order.
    ///
    /// Fills `output` with as many pairs as available, up to `output.len()`.
    /// Returns the number of pairs actually read.
    pub fn read(&mut self, output: &mut [SamplePair]) -> usize {
        let to_read = self.len.min(output.len());
        if to_read == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = to_read.min(capacity - self.read_pos);
        output[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        output[first..to_read].copy_from_slice(&self.buffer[..to_read - first]);

        self.read_pos = (self.read_pos + to_read) % capacity;
        self.len -= to_read;
        to_read
    }

    /// Returns the number of pairs currently available to read.
    pub fn available(&self) -> usize {
        self.len
    }

    /// Returns the number of pairs that can be written.
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len
    }

    /// Returns the total capacity of the buffer in pairs.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the buffer fill percentage (0.0 to 1.0).
    pub fn fill_level(&self) -> f32 {
        self.len as f32 / self.capacity() as f32
    }

    /// Discard all pending pairs.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    /// Returns `true` if the buffer has no pairs available.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the buffer is full.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(values: &[i16]) -> Vec<SamplePair> {
        values.iter().map(|&v| SamplePair::new(v, -v)).collect()
    }

    #[test]
    fn test_ring_buffer_creation() {
        let buffer = RingBuffer::new(1024);
        assert_eq!(buffer.capacity(), 1024);
        assert_eq!(buffer.available(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_ring_buffer_write_read() {
        let mut buffer = RingBuffer::new(1024);

        let samples = pairs(&[1, 2, 3, 4]);
        assert_eq!(buffer.write(&samples), 4);
        assert_eq!(buffer.available(), 4);

        let mut output = vec![SamplePair::SILENCE; 4];
        assert_eq!(buffer.read(&mut output), 4);
        assert_eq!(output, samples);
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn test_ring_buffer_wrap_around() {
        let mut buffer = RingBuffer::new(8);

        buffer.write(&pairs(&[1, 2, 3, 4, 5, 6, 7, 8]));
        assert!(buffer.is_full());

        let mut output = vec![SamplePair::SILENCE; 4];
        buffer.read(&mut output);
        assert_eq!(output, pairs(&[1, 2, 3, 4]));

        // Wraps past the end of the backing storage
        assert_eq!(buffer.write(&pairs(&[9, 10, 11, 12])), 4);

        let mut output = vec![SamplePair::SILENCE; 8];
        assert_eq!(buffer.read(&mut output), 8);
        assert_eq!(output, pairs(&[5, 6, 7, 8, 9, 10, 11, 12]));
    }

    #[test]
    fn test_ring_buffer_never_overwrites() {
        let mut buffer = RingBuffer::new(4);

        let written = buffer.write(&pairs(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(written, 4);
        assert!(!buffer.push(SamplePair::new(7, 7)));

        let mut output = vec![SamplePair::SILENCE; 8];
        assert_eq!(buffer.read(&mut output), 4);
        assert_eq!(&output[..4], pairs(&[1, 2, 3, 4]).as_slice());
    }

    #[test]
    fn test_ring_buffer_partial_read() {
        let mut buffer = RingBuffer::new(1024);
        buffer.write(&pairs(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));

        let mut output = vec![SamplePair::SILENCE; 5];
        assert_eq!(buffer.read(&mut output), 5);
        assert_eq!(output, pairs(&[1, 2, 3, 4, 5]));
        assert_eq!(buffer.available(), 5);
    }

    #[test]
    fn test_ring_buffer_fill_level_and_free_space() {
        let mut buffer = RingBuffer::new(100);
        buffer.write(&vec![SamplePair::new(1, 1); 50]);

        assert!((buffer.fill_level() - 0.5).abs() < 0.01);
        assert_eq!(buffer.free_space(), 50);
    }

    #[test]
    fn test_ring_buffer_clear() {
        let mut buffer = RingBuffer::new(16);
        buffer.write(&pairs(&[1, 2, 3, 4]));
        buffer.clear();
        assert!(buffer.is_empty());

        let mut output = vec![SamplePair::SILENCE; 4];
        assert_eq!(buffer.read(&mut output), 0);
    }
}
