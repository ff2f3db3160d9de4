//! Fixed-capacity multi-row circular buffer.
//!
//! Used by output stages that keep windowed statistics (for example the
//! min/max history behind colormap limits). Columns are appended with
//! [`RingBuffer::extend`]; once the buffer holds `capacity` columns the oldest
//! ones are evicted first. There is no pinning or priority: eviction is
//! unconditional FIFO.

use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{PipelineError, PipelineResult};

/// Upper bound on `rows × capacity` (256 MiB of `f64`).
pub const MAX_ELEMENTS: usize = 1 << 25;

/// `rows × capacity` circular storage of `f64` columns.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    rows: usize,
    capacity: usize,
    /// Row-major `rows × capacity` storage.
    data: Vec<f64>,
    /// Column index where the next write lands.
    head: usize,
    /// Number of valid columns, `<= capacity`.
    len: usize,
}

impl RingBuffer {
    /// Allocate a `rows × capacity` buffer.
    ///
    /// Fails with `BufferTooLarge` when the element count overflows or
    /// exceeds [`MAX_ELEMENTS`].
    pub fn new(rows: usize, capacity: usize) -> PipelineResult<Self> {
        let elements = rows
            .checked_mul(capacity)
            .filter(|n| *n <= MAX_ELEMENTS)
            .ok_or(PipelineError::BufferTooLarge { rows, capacity })?;
        Ok(Self {
            rows,
            capacity,
            data: vec![0.0; elements],
            head: 0,
            len: 0,
        })
    }

    /// Buffer that holds nothing until replaced.
    pub fn empty(rows: usize) -> Self {
        Self {
            rows,
            capacity: 0,
            data: Vec::new(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of columns currently held, `min(total_written, capacity)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Append `block`'s columns, evicting the oldest columns on overflow.
    ///
    /// Fails with `ShapeMismatch` if `block` does not have exactly `rows()` rows;
    /// the buffer is left untouched in that case.
    pub fn extend(&mut self, block: &Chunk) -> PipelineResult<()> {
        if block.rows() != self.rows {
            return Err(PipelineError::ShapeMismatch {
                expected_rows: self.rows,
                actual_rows: block.rows(),
            });
        }
        if self.capacity == 0 || block.columns() == 0 {
            return Ok(());
        }

        // Columns older than the last `capacity` would be overwritten anyway.
        let skip = block.columns().saturating_sub(self.capacity);
        for column in skip..block.columns() {
            for row in 0..self.rows {
                self.data[row * self.capacity + self.head] = block.row(row)[column];
            }
            self.head = (self.head + 1) % self.capacity;
        }
        self.len = (self.len + block.columns()).min(self.capacity);
        Ok(())
    }

    /// Contents as `rows × len()` in chronological order (oldest first).
    pub fn data(&self) -> Chunk {
        let mut out = Chunk::zeros(self.rows, self.len);
        // When full, head points at the oldest column.
        let start = (self.head + self.capacity - self.len) % self.capacity.max(1);
        for row in 0..self.rows {
            let src = &self.data[row * self.capacity..(row + 1) * self.capacity];
            let dst = out.row_mut(row);
            for (i, slot) in dst.iter_mut().enumerate() {
                *slot = src[(start + i) % self.capacity];
            }
        }
        out
    }

    /// Chronological values of a single row.
    pub fn row(&self, row: usize) -> Vec<f64> {
        if row >= self.rows || self.len == 0 {
            return Vec::new();
        }
        let start = (self.head + self.capacity - self.len) % self.capacity;
        let src = &self.data[row * self.capacity..(row + 1) * self.capacity];
        (0..self.len).map(|i| src[(start + i) % self.capacity]).collect()
    }

    /// Reset to zero columns.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(rows: &[&[f64]]) -> Chunk {
        Chunk::from_rows(rows).unwrap()
    }

    #[test]
    fn test_eviction_keeps_latest_columns() {
        let mut buf = RingBuffer::new(2, 4).unwrap();
        buf.extend(&chunk(&[&[1.0, 2.0], &[9.0, 8.0]])).unwrap();
        buf.extend(&chunk(&[&[3.0, 4.0, 5.0], &[7.0, 6.0, 5.0]])).unwrap();

        assert_eq!(
            buf.data().to_rows(),
            vec![vec![2.0, 3.0, 4.0, 5.0], vec![8.0, 7.0, 6.0, 5.0]]
        );
        assert!(buf.is_full());
    }

    #[test]
    fn test_partial_fill_preserves_order() {
        let mut buf = RingBuffer::new(1, 10).unwrap();
        buf.extend(&chunk(&[&[1.0, 2.0]])).unwrap();
        buf.extend(&chunk(&[&[3.0]])).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.data().to_rows(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_block_larger_than_capacity() {
        let mut buf = RingBuffer::new(1, 3).unwrap();
        buf.extend(&chunk(&[&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]])).unwrap();
        assert_eq!(buf.data().to_rows(), vec![vec![5.0, 6.0, 7.0]]);
    }

    #[test]
    fn test_shape_mismatch_leaves_buffer_untouched() {
        let mut buf = RingBuffer::new(2, 4).unwrap();
        buf.extend(&chunk(&[&[1.0], &[2.0]])).unwrap();
        let err = buf.extend(&chunk(&[&[1.0, 2.0]])).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShapeMismatch {
                expected_rows: 2,
                actual_rows: 1
            }
        ));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut buf = RingBuffer::new(1, 2).unwrap();
        buf.extend(&chunk(&[&[1.0, 2.0]])).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.data().shape(), (1, 0));
        buf.extend(&chunk(&[&[5.0]])).unwrap();
        assert_eq!(buf.row(0), vec![5.0]);
    }

    #[test]
    fn test_oversized_buffer_is_an_error() {
        assert!(matches!(
            RingBuffer::new(2, usize::MAX),
            Err(PipelineError::BufferTooLarge { rows: 2, .. })
        ));
        assert!(RingBuffer::new(2, MAX_ELEMENTS / 2 + 1).is_err());
        assert!(RingBuffer::new(MAX_ELEMENTS + 1, 1).is_err());
    }

    #[test]
    fn test_empty_buffer() {
        let mut buf = RingBuffer::empty(2);
        buf.extend(&chunk(&[&[1.0], &[2.0]])).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.rows(), 2);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut buf = RingBuffer::new(2, 0).unwrap();
        buf.extend(&chunk(&[&[1.0], &[2.0]])).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.data().shape(), (2, 0));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_holds_most_recent_columns(
            capacity in 1usize..16,
            blocks in prop::collection::vec(prop::collection::vec(-1e6f64..1e6, 0..12), 0..20)
        ) {
            let mut buf = RingBuffer::new(1, capacity).unwrap();
            let mut written = Vec::new();
            for block in &blocks {
                buf.extend(&Chunk::from_rows(&[block.as_slice()]).unwrap()).unwrap();
                written.extend_from_slice(block);
            }

            let keep = written.len().min(capacity);
            let expected = &written[written.len() - keep..];
            let data = buf.data();
            prop_assert_eq!(data.columns(), keep);
            prop_assert_eq!(data.row(0), expected);
        }
    }
}
