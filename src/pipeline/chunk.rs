//! Reusable multichannel data chunk.
//!
//! A `Chunk` is a `rows × columns` block of `f64` samples: one row per
//! channel, one column per time sample. Each node slot owns one output chunk
//! that is reused every tick, so steady-state processing does not reallocate
//! once the chunk has reached its working size.

use crate::pipeline::error::{PipelineError, PipelineResult};

/// Row-major `rows × columns` sample block.
#[derive(Clone, Default, PartialEq)]
pub struct Chunk {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

impl Chunk {
    /// Create a new empty chunk (0 × 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero-filled chunk.
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Build a chunk from per-channel rows. All rows must have equal length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> PipelineResult<Self> {
        let columns = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * columns);
        for row in rows {
            let row = row.as_ref();
            if row.len() != columns {
                return Err(PipelineError::InvalidAttachment(format!(
                    "ragged chunk: expected {} columns, got {}",
                    columns,
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            columns,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    /// Resize to `rows × columns`, zero-filling. Keeps the allocation.
    pub fn resize(&mut self, rows: usize, columns: usize) {
        self.rows = rows;
        self.columns = columns;
        self.data.clear();
        self.data.resize(rows * columns, 0.0);
    }

    /// Drop all columns but keep the row count and the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.columns = 0;
        self.data.clear();
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row < self.rows && column < self.columns {
            Some(self.data[row * self.columns + column])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        if row < self.rows && column < self.columns {
            self.data[row * self.columns + column] = value;
        }
    }

    /// One channel's samples.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.columns;
        &self.data[start..start + self.columns]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.columns;
        &mut self.data[start..start + self.columns]
    }

    /// Iterate over channels.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Values of one time sample across all channels.
    pub fn column(&self, column: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.rows).map(move |r| self.data[r * self.columns + column])
    }

    /// All samples in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy shape and content from `src`, reusing this chunk's allocation.
    pub fn copy_from(&mut self, src: &Chunk) {
        self.rows = src.rows;
        self.columns = src.columns;
        self.data.clear();
        self.data.extend_from_slice(&src.data);
    }

    /// Apply `f` to every sample in place.
    pub fn map_in_place(&mut self, mut f: impl FnMut(f64) -> f64) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }

    /// Per-rows nested vectors, mostly useful for assertions and logging.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .finish()
    }
}
