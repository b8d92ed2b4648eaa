//! # Grid Access Module
//!
//! The `GridSource` capability consumed by the structure-analysis core. A grid
//! source exposes sheet dimensions, merged regions, and cell values, and
//! supports chunked row iteration. The physical file-reading strategy behind a
//! source is interchangeable: two implementations must produce identical merge
//! maps and record sequences for the same input.
pub(crate) mod factory;
pub(crate) mod memory;
pub(crate) mod value;

pub use factory::{select_strategy, GridLease, GridStrategy};
pub use memory::MemoryGrid;
pub use value::{CellStyle, CellValue};

use crate::structure::MergedRegion;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by grid source implementations while accessing the
/// underlying workbook. Not retried by the core; the failing unit is
/// surfaced cleanly and any checkpoint is left intact.
#[derive(Error, Debug)]
pub enum SourceAccessError {
    #[error("workbook '{path}' not found")]
    FileMissing { path: String },

    #[error("sheet '{sheet}' not found")]
    SheetNotFound { sheet: String },

    #[error("workbook '{path}' could not be read: {message}")]
    Unreadable { path: String, message: String },

    #[error("grid source has not been opened")]
    NotOpen,
}

/// Raised when a second concurrent access to one workbook file is attempted
/// while another grid source already holds it. Prevented by construction
/// through [`GridLease`]; surfaced defensively if the discipline is violated.
#[derive(Error, Debug)]
#[error("workbook '{path}' is already open in another grid source")]
pub struct GridContentionError {
    pub path: String,
}

/// Sheet boundaries, all 1-based and inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl Dimensions {
    /// Number of columns covered by the sheet.
    pub fn width(&self) -> u32 {
        self.max_col.saturating_sub(self.min_col) + 1
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        self.min_row <= row && row <= self.max_row && self.min_col <= col && col <= self.max_col
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..={}, columns {}..={}",
            self.min_row, self.max_row, self.min_col, self.max_col
        )
    }
}

/// Populated cells of one row, keyed by 1-based column index.
pub type RowValues = BTreeMap<u32, CellValue>;

/// A bounded, contiguous window of rows pulled from a grid source as one unit
/// of streaming work.
#[derive(Clone, Debug)]
pub struct RowChunk {
    pub start_row: u32,
    pub rows: Vec<(u32, RowValues)>,
}

/// Capability interface over one open workbook. Implementations own the file
/// handle exclusively; two workers must never share one instance.
pub trait GridSource {
    /// Opens the underlying workbook. Must be called before any access.
    fn open(&mut self) -> Result<(), SourceAccessError>;

    /// Releases the underlying resources. Safe to call after a failed `open`.
    fn close(&mut self);

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    fn dimensions(&self, sheet: &str) -> Result<Dimensions, SourceAccessError>;

    /// Merge regions as stored in the file, in no guaranteed order.
    fn merged_regions(&self, sheet: &str) -> Result<Vec<MergedRegion>, SourceAccessError>;

    /// Populated cells of one row. Cells inside a merge but outside its anchor
    /// are reported empty, per spreadsheet convention.
    fn row_values(&self, sheet: &str, row: u32) -> Result<RowValues, SourceAccessError>;

    /// Style signal for header detection. Sources without style information
    /// return `None` and detection falls back to content density alone.
    fn cell_style(&self, _sheet: &str, _row: u32, _col: u32) -> Option<CellStyle> {
        None
    }

    /// Lazily iterates rows `start_row..=end_row` in chunks of `chunk_size`.
    /// Finite; restartable by re-invoking with a new `start_row`.
    fn iterate_rows<'a>(
        &'a self,
        sheet: &'a str,
        start_row: u32,
        end_row: u32,
        chunk_size: usize,
    ) -> RowChunks<'a, Self>
    where
        Self: Sized,
    {
        RowChunks {
            source: self,
            sheet,
            next_row: start_row,
            end_row,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// Iterator over row chunks, driven by repeated `row_values` calls.
pub struct RowChunks<'a, G: GridSource> {
    source: &'a G,
    sheet: &'a str,
    next_row: u32,
    end_row: u32,
    chunk_size: usize,
}

impl<G: GridSource> Iterator for RowChunks<'_, G> {
    type Item = Result<RowChunk, SourceAccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row > self.end_row {
            return None;
        }
        let start_row = self.next_row;
        let span = u32::try_from(self.chunk_size).unwrap_or(u32::MAX);
        let last_row = self.end_row.min(start_row.saturating_add(span - 1));
        let mut rows = Vec::with_capacity((last_row - start_row + 1) as usize);
        for row in start_row..=last_row {
            match self.source.row_values(self.sheet, row) {
                Ok(values) => rows.push((row, values)),
                Err(e) => {
                    self.next_row = self.end_row + 1;
                    return Some(Err(e));
                }
            }
        }
        self.next_row = last_row + 1;
        Some(Ok(RowChunk { start_row, rows }))
    }
}
