use crate::grid::{CellStyle, CellValue, Dimensions, GridSource, RowValues, SourceAccessError};
use crate::structure::{CellRange, MergedRegion};
use indexmap::IndexMap;
use std::collections::HashMap;

/// One sheet of an in-memory grid.
#[derive(Default)]
pub struct MemorySheet {
    cells: HashMap<(u32, u32), CellValue>,
    styles: HashMap<(u32, u32), CellStyle>,
    merges: Vec<CellRange>,
}

impl MemorySheet {
    /// Sets a cell value, replacing any previous value at the position.
    pub fn set(&mut self, row: u32, col: u32, value: CellValue) -> &mut Self {
        self.cells.insert((row, col), value);
        self
    }

    pub fn set_text(&mut self, row: u32, col: u32, text: &str) -> &mut Self {
        self.set(row, col, CellValue::Text(text.to_owned()))
    }

    pub fn set_style(&mut self, row: u32, col: u32, style: CellStyle) -> &mut Self {
        self.styles.insert((row, col), style);
        self
    }

    /// Declares a merged region. The anchor value is whatever is stored at the
    /// region's top-left cell when the region is queried.
    pub fn merge(&mut self, range: CellRange) -> &mut Self {
        self.merges.push(range);
        self
    }

    fn dimensions(&self) -> Dimensions {
        let mut max_row = 1;
        let mut max_col = 1;
        for (row, col) in self.cells.keys() {
            max_row = max_row.max(*row);
            max_col = max_col.max(*col);
        }
        for range in &self.merges {
            max_row = max_row.max(range.max_row);
            max_col = max_col.max(range.max_col);
        }
        Dimensions {
            min_row: 1,
            max_row,
            min_col: 1,
            max_col,
        }
    }
}

/// In-memory `GridSource` backing unit tests and pre-parsed grids handed over
/// by an external reading layer.
#[derive(Default)]
pub struct MemoryGrid {
    sheets: IndexMap<String, MemorySheet>,
    open: bool,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self {
            sheets: IndexMap::new(),
            open: true,
        }
    }

    /// Returns the sheet with the given name, creating it if absent.
    pub fn sheet_mut(&mut self, name: &str) -> &mut MemorySheet {
        self.sheets.entry(name.to_owned()).or_default()
    }

    fn sheet(&self, name: &str) -> Result<&MemorySheet, SourceAccessError> {
        if !self.open {
            return Err(SourceAccessError::NotOpen);
        }
        self.sheets.get(name).ok_or(SourceAccessError::SheetNotFound {
            sheet: name.to_owned(),
        })
    }
}

impl GridSource for MemoryGrid {
    fn open(&mut self) -> Result<(), SourceAccessError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn dimensions(&self, sheet: &str) -> Result<Dimensions, SourceAccessError> {
        Ok(self.sheet(sheet)?.dimensions())
    }

    fn merged_regions(&self, sheet: &str) -> Result<Vec<MergedRegion>, SourceAccessError> {
        let sheet = self.sheet(sheet)?;
        Ok(sheet
            .merges
            .iter()
            .map(|range| {
                let value = sheet
                    .cells
                    .get(&(range.min_row, range.min_col))
                    .cloned()
                    .unwrap_or_default();
                MergedRegion::new(*range, value)
            })
            .collect())
    }

    fn row_values(&self, sheet: &str, row: u32) -> Result<RowValues, SourceAccessError> {
        let sheet = self.sheet(sheet)?;
        Ok(sheet
            .cells
            .iter()
            .filter(|((r, _), value)| *r == row && !value.is_empty())
            .map(|((_, col), value)| (*col, value.clone()))
            .collect())
    }

    fn cell_style(&self, sheet: &str, row: u32, col: u32) -> Option<CellStyle> {
        self.sheet(sheet).ok()?.styles.get(&(row, col)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_cover_cells_and_merges() {
        let mut grid = MemoryGrid::new();
        grid.sheet_mut("Data")
            .set_text(2, 3, "x")
            .merge(CellRange::new(1, 1, 1, 8));
        let dims = grid.dimensions("Data").unwrap();
        assert_eq!(dims.max_row, 2);
        assert_eq!(dims.max_col, 8);
    }

    #[test]
    fn merge_anchor_value_comes_from_top_left() {
        let mut grid = MemoryGrid::new();
        grid.sheet_mut("Data")
            .set_text(5, 1, "EQ-001")
            .merge(CellRange::new(5, 7, 1, 1));
        let regions = grid.merged_regions("Data").unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].value, CellValue::Text("EQ-001".to_owned()));
    }

    #[test]
    fn closed_grid_refuses_access() {
        let mut grid = MemoryGrid::new();
        grid.sheet_mut("Data").set_text(1, 1, "a");
        grid.close();
        assert!(matches!(
            grid.row_values("Data", 1),
            Err(SourceAccessError::NotOpen)
        ));
        grid.open().unwrap();
        assert_eq!(grid.row_values("Data", 1).unwrap().len(), 1);
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let grid = MemoryGrid::new();
        assert!(matches!(
            grid.dimensions("Nope"),
            Err(SourceAccessError::SheetNotFound { .. })
        ));
    }
}
