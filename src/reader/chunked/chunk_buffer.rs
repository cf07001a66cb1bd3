// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reusable storage for one decoded chunk.
//!
//! A `ChunkBuffer` keeps every cell of a chunk in one contiguous string plus
//! a row-major table of cell spans. Resetting it for the next chunk clears
//! both without releasing their capacity, so a prefetch slot allocates once
//! and then cycles through the whole result set.

use crate::error::{Error, Result};
use crate::types::chunk::ChunkDescriptor;

/// Upper bound on rows reserved up front from a descriptor's announced
/// row count. Larger chunks grow the table while decoding.
const MAX_RESERVED_ROWS: usize = 4096;

/// Lifecycle of a chunk buffer.
///
/// State transitions:
/// ```text
///   Idle -> Downloading (reset to a descriptor)
///   Downloading -> Decoded (body parsed)
///   Downloading -> Failed (download or parse error)
///   Decoded -> Consumed (consumer moved past it)
///   Consumed | Failed -> Downloading (reset to the next descriptor)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    Downloading,
    Decoded,
    Consumed,
    Failed,
}

/// Byte range of a non-null cell inside `ChunkBuffer::data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellSpan {
    start: usize,
    end: usize,
}

/// Decoded rows and columns of one chunk.
#[derive(Debug)]
pub struct ChunkBuffer {
    slot: usize,
    column_count: usize,
    descriptor: Option<ChunkDescriptor>,
    state: BufferState,
    data: String,
    cells: Vec<Option<CellSpan>>,
    /// Index into `cells` where the row being decoded starts.
    row_start: usize,
    row_count: usize,
    resets: u64,
}

impl ChunkBuffer {
    /// Create an empty buffer for the given prefetch slot.
    pub fn new(slot: usize, column_count: usize) -> Self {
        Self {
            slot,
            column_count,
            descriptor: None,
            state: BufferState::Idle,
            data: String::new(),
            cells: Vec::new(),
            row_start: 0,
            row_count: 0,
            resets: 0,
        }
    }

    /// Point this buffer at a new chunk, discarding the previous content.
    ///
    /// Fails while a download is writing into the buffer.
    pub fn reset(&mut self, descriptor: &ChunkDescriptor) -> Result<()> {
        if self.state == BufferState::Downloading {
            return Err(Error::Internal(format!(
                "slot {} reset while chunk {:?} is still downloading",
                self.slot,
                self.descriptor.as_ref().map(|d| d.index)
            )));
        }
        if descriptor.column_count != self.column_count {
            return Err(Error::Config(format!(
                "chunk {} has {} columns, buffer expects {}",
                descriptor.index, descriptor.column_count, self.column_count
            )));
        }

        self.data.clear();
        self.cells.clear();
        let reserved_cells = descriptor
            .row_count
            .min(MAX_RESERVED_ROWS)
            .saturating_mul(self.column_count);
        // On failure the table grows while decoding.
        let _ = self.cells.try_reserve(reserved_cells);
        self.row_start = 0;
        self.row_count = 0;
        self.descriptor = Some(descriptor.clone());
        self.state = BufferState::Downloading;
        self.resets += 1;
        Ok(())
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Descriptor of the chunk this buffer currently holds.
    pub fn descriptor(&self) -> Option<&ChunkDescriptor> {
        self.descriptor.as_ref()
    }

    /// Index of the chunk this buffer currently holds.
    pub fn chunk_index(&self) -> Option<usize> {
        self.descriptor.as_ref().map(|d| d.index)
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of fully decoded rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// How many times this buffer has been pointed at a chunk.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Capacity of the cell table, in cells.
    pub fn cell_capacity(&self) -> usize {
        self.cells.capacity()
    }

    /// Value of one cell; `None` for SQL NULL.
    pub fn cell(&self, row: usize, column: usize) -> Result<Option<&str>> {
        if row >= self.row_count {
            return Err(Error::OutOfRange {
                what: "row",
                index: row,
                limit: self.row_count,
            });
        }
        if column >= self.column_count {
            return Err(Error::OutOfRange {
                what: "column",
                index: column,
                limit: self.column_count,
            });
        }
        let span = self.cells[row * self.column_count + column];
        Ok(span.map(|s| &self.data[s.start..s.end]))
    }

    /// Whether one cell is SQL NULL.
    pub fn is_null(&self, row: usize, column: usize) -> Result<bool> {
        Ok(self.cell(row, column)?.is_none())
    }

    /// All cells of one row, in column order.
    pub fn row(&self, row: usize) -> Result<Vec<Option<&str>>> {
        (0..self.column_count)
            .map(|column| self.cell(row, column))
            .collect()
    }

    // --- Decoder interface ---

    pub(crate) fn begin_row(&mut self) {
        self.row_start = self.cells.len();
    }

    pub(crate) fn push_cell(&mut self, value: Option<&str>) {
        let span = value.map(|v| {
            let start = self.data.len();
            self.data.push_str(v);
            CellSpan {
                start,
                end: self.data.len(),
            }
        });
        self.cells.push(span);
    }

    /// Close the current row, checking its arity.
    pub(crate) fn end_row(&mut self) -> std::result::Result<(), String> {
        let width = self.cells.len() - self.row_start;
        if width != self.column_count {
            return Err(format!(
                "row {} has {} cells, expected {}",
                self.row_count, width, self.column_count
            ));
        }
        self.row_count += 1;
        Ok(())
    }

    pub(crate) fn mark_decoded(&mut self) {
        self.state = BufferState::Decoded;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = BufferState::Failed;
    }

    /// Record that the consumer is done reading this buffer.
    pub(crate) fn mark_consumed(&mut self) {
        if self.state == BufferState::Decoded {
            self.state = BufferState::Consumed;
        }
    }
}
