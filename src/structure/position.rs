use crate::grid::CellValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Converts a 1-based column index to its Excel-style letter ("A", "AB").
pub fn column_letter(col: u32) -> String {
    let mut col = col;
    let mut letters = String::new();
    while col > 0 {
        col -= 1;
        let digit = char::from_u32(65 + col % 26).expect("Hardcode letters");
        col /= 26;
        letters.insert(0, digit);
    }
    letters
}

/// Excel-style reference for a 1-based (row, column) pair, e.g. "B3".
pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// A single cell coordinate. Rows and columns are 1-based; ordering is
/// row-major.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: u32,
    pub col: u32,
}

impl CellPosition {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn reference(&self) -> String {
        cell_reference(self.row, self.col)
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

/// A rectangular region of cells, 1-based and inclusive on both ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl CellRange {
    pub fn new(min_row: u32, max_row: u32, min_col: u32, max_col: u32) -> Self {
        debug_assert!(min_row >= 1 && min_col >= 1);
        debug_assert!(min_row <= max_row && min_col <= max_col);
        Self {
            min_row,
            max_row,
            min_col,
            max_col,
        }
    }

    pub fn height(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub fn width(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    pub fn anchor(&self) -> CellPosition {
        CellPosition::new(self.min_row, self.min_col)
    }

    pub fn contains(&self, pos: CellPosition) -> bool {
        self.min_row <= pos.row
            && pos.row <= self.max_row
            && self.min_col <= pos.col
            && pos.col <= self.max_col
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.min_row <= other.max_row
            && other.min_row <= self.max_row
            && self.min_col <= other.max_col
            && other.min_col <= self.max_col
    }

    /// Every position covered by the range, row-major.
    pub fn positions(&self) -> impl Iterator<Item = CellPosition> + '_ {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_col..=self.max_col).map(move |col| CellPosition::new(row, col))
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            cell_reference(self.min_row, self.min_col),
            cell_reference(self.max_row, self.max_col)
        )
    }
}

/// Shape classification of a merged region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeKind {
    /// Taller than wide; encodes a parent value shared by several rows.
    Vertical,
    /// Wider than tall; encodes a compound label spanning several columns.
    Horizontal,
    /// Both dimensions > 1; treated as vertical-dominant for hierarchy.
    Block,
}

/// A merged region plus the value of its anchor (top-left) cell. All other
/// cells in the region are logically empty but spatially part of it.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedRegion {
    pub range: CellRange,
    pub value: CellValue,
}

impl MergedRegion {
    pub fn new(range: CellRange, value: CellValue) -> Self {
        Self { range, value }
    }

    pub fn kind(&self) -> MergeKind {
        match (self.range.height() > 1, self.range.width() > 1) {
            (true, true) => MergeKind::Block,
            (true, false) => MergeKind::Vertical,
            _ => MergeKind::Horizontal,
        }
    }

    /// Vertical and block merges both open a parent grouping over rows.
    pub fn is_vertical_dominant(&self) -> bool {
        self.range.height() > 1
    }

    pub fn is_horizontal(&self) -> bool {
        self.range.height() == 1 && self.range.width() > 1
    }

    pub fn anchor(&self) -> CellPosition {
        self.range.anchor()
    }
}
