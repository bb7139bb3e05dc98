//! Fixed-capacity circular storage for one scalar signal.
//!
//! Samples are addressed by a logical index that grows forever; the
//! physical slot is `index mod capacity`. Writing never allocates, and a
//! read of an index older than the last `capacity` writes returns whatever
//! now occupies that slot. Window starts before index 0 resolve to the
//! zero-initialised tail of the buffer, which is where the warm-up
//! transient of the derived signals comes from.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Logical position of a sample in the stream.
pub type SampleIndex = u64;

/// Half-open range of logical indices `[start, end)`.
pub type SampleRange = Range<SampleIndex>;

/// Circular buffer of `f64` samples addressed by logical index.
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    data: Box<[f64]>,
}

impl CircularBuffer {
    /// Allocates a zero-filled buffer of the given capacity.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            data: vec![0.0; capacity.get()].into_boxed_slice(),
        }
    }

    /// Number of physical slots.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Stores `value` in the slot for `index`, replacing the previous occupant.
    pub fn write(&mut self, index: SampleIndex, value: f64) {
        let slot = self.slot(index as i64);
        self.data[slot] = value;
    }

    /// Reads the slot for `index`.
    ///
    /// Only meaningful when `index` is among the most recent `capacity`
    /// writes; otherwise the overwritten content is returned.
    pub fn read(&self, index: SampleIndex) -> f64 {
        self.data[self.slot(index as i64)]
    }

    /// Reads a possibly pre-stream (negative) index using a non-negative remainder.
    pub fn read_signed(&self, index: i64) -> f64 {
        self.data[self.slot(index)]
    }

    /// Iterates the `len` samples ending at `last` (inclusive), oldest first.
    ///
    /// Indices before 0 are resolved through [`read_signed`](Self::read_signed).
    pub fn trailing(&self, last: SampleIndex, len: usize) -> impl Iterator<Item = f64> + '_ {
        let first = last as i64 - len as i64 + 1;
        (first..=last as i64).map(move |i| self.read_signed(i))
    }

    /// Copies the values of `range` out in ascending index order.
    pub fn snapshot(&self, range: SampleRange) -> Vec<f64> {
        range.map(|i| self.read(i)).collect()
    }

    fn slot(&self, index: i64) -> usize {
        index.rem_euclid(self.data.len() as i64) as usize
    }
}
