use crate::error::Result;
use crate::grid::{CellValue, GridSource};
use crate::structure::{
    column_letter, CellPosition, MergeMap, MetadataDetectionResult,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Resolved header labels keyed by 1-based column index, in column order.
pub type HeaderMap = IndexMap<u32, String>;

/// Precedence between the levels of a multi-level header. The reference
/// layouts are not self-consistent, so the rule is a policy rather than a
/// constant.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiLevelPolicy {
    /// The level closest to the data supplies the label; the upper level is
    /// only a fallback for blank cells under a merged span.
    #[default]
    LowerWins,
    /// The upper level supplies the label; lower levels fill in blanks.
    UpperWins,
}

/// Merge-aware text of the header cell at (row, col): a covered cell reads
/// through to its region's anchor value.
fn header_cell_text<G: GridSource>(
    grid: &G,
    sheet: &str,
    merges: &MergeMap,
    row: u32,
    col: u32,
) -> Result<Option<String>> {
    if let Some(region) = merges.region_at(CellPosition::new(row, col)) {
        return Ok(region.value.label_text());
    }
    let values = grid.row_values(sheet, row)?;
    Ok(values.get(&col).and_then(CellValue::label_text))
}

/// Appends a disambiguating occurrence suffix when a label repeats, so no
/// column is ever dropped.
fn dedupe(label: String, seen: &mut HashMap<String, usize>, col: u32) -> String {
    let count = seen.entry(label.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        label
    } else {
        let unique = format!("{} ({})", label, *count);
        warn!(
            column = %column_letter(col),
            label,
            resolved = %unique,
            "duplicate header label disambiguated"
        );
        unique
    }
}

/// Consolidates the detected header row(s) into one label per data column.
///
/// With a synthetic header (none detected), labels are generated as
/// `Column {n}` for every populated column of the first data row.
pub fn resolve_headers<G: GridSource>(
    grid: &G,
    sheet: &str,
    merges: &MergeMap,
    detection: &MetadataDetectionResult,
    policy: MultiLevelPolicy,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut seen = HashMap::new();

    if detection.has_synthetic_header() {
        let dims = grid.dimensions(sheet)?;
        if detection.data_start_row > dims.max_row {
            return Ok(headers);
        }
        for (col, value) in grid.row_values(sheet, detection.data_start_row)? {
            if !value.is_empty() {
                headers.insert(col, dedupe(format!("Column {}", col), &mut seen, col));
            }
        }
        return Ok(headers);
    }

    let dims = grid.dimensions(sheet)?;
    // Level order depends on policy: the winning level is consulted first.
    let mut rows = detection.header_rows.clone();
    match policy {
        MultiLevelPolicy::LowerWins => rows.reverse(),
        MultiLevelPolicy::UpperWins => {}
    }
    for col in dims.min_col..=dims.max_col {
        let mut label = None;
        for &row in &rows {
            if let Some(text) = header_cell_text(grid, sheet, merges, row, col)? {
                label = Some(text);
                break;
            }
        }
        let label = label.unwrap_or_else(|| format!("Column {}", col));
        headers.insert(col, dedupe(label, &mut seen, col));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemoryGrid;
    use crate::structure::{detect, CellRange, DetectOptions, MergeMap};

    fn analyze(grid: &MemoryGrid, sheet: &str) -> (MergeMap, MetadataDetectionResult) {
        let dims = grid.dimensions(sheet).unwrap();
        let merges = MergeMap::build(sheet, &dims, grid.merged_regions(sheet).unwrap()).unwrap();
        let detection = detect(grid, sheet, &merges, &DetectOptions::default()).unwrap();
        (merges, detection)
    }

    fn metrics_grid() -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        let sheet = grid.sheet_mut("Metrics");
        sheet.set_text(1, 1, "Line");
        sheet.set_text(1, 2, "Production Metrics");
        sheet.merge(CellRange::new(1, 1, 2, 3));
        sheet.set_text(1, 4, "Units");
        sheet.merge(CellRange::new(1, 1, 4, 5));
        sheet.set_text(2, 2, "Daily Output");
        sheet.set_text(2, 3, "Weekly Output");
        for row in 3..=4 {
            for col in 1..=5 {
                sheet.set(row, col, crate::grid::CellValue::Int((10 * row + col) as i64));
            }
        }
        grid
    }

    #[test]
    fn lower_level_wins_and_upper_fills_blanks() {
        let grid = metrics_grid();
        let (merges, detection) = analyze(&grid, "Metrics");
        assert_eq!(detection.header_rows, vec![1, 2]);
        let headers =
            resolve_headers(&grid, "Metrics", &merges, &detection, MultiLevelPolicy::LowerWins)
                .unwrap();
        assert_eq!(headers[&1], "Line");
        assert_eq!(headers[&2], "Daily Output");
        assert_eq!(headers[&3], "Weekly Output");
        // Blank sub-cells under the merged "Units" span fall back upward.
        assert_eq!(headers[&4], "Units");
        assert_eq!(headers[&5], "Units (2)");
    }

    #[test]
    fn upper_wins_policy_prefers_the_category_row() {
        let grid = metrics_grid();
        let (merges, detection) = analyze(&grid, "Metrics");
        let headers =
            resolve_headers(&grid, "Metrics", &merges, &detection, MultiLevelPolicy::UpperWins)
                .unwrap();
        assert_eq!(headers[&2], "Production Metrics");
        assert_eq!(headers[&3], "Production Metrics (2)");
    }

    #[test]
    fn duplicate_labels_are_disambiguated_not_dropped() {
        let mut grid = MemoryGrid::new();
        let sheet = grid.sheet_mut("Dup");
        sheet.set_text(1, 1, "Total");
        sheet.set_text(1, 2, "Total");
        sheet.set_text(1, 3, "Net");
        sheet.set(2, 1, crate::grid::CellValue::Int(1));
        let (merges, detection) = analyze(&grid, "Dup");
        let headers =
            resolve_headers(&grid, "Dup", &merges, &detection, MultiLevelPolicy::LowerWins)
                .unwrap();
        assert_eq!(headers[&1], "Total");
        assert_eq!(headers[&2], "Total (2)");
        assert_eq!(headers[&3], "Net");
        let mut labels: Vec<&String> = headers.values().collect();
        labels.dedup();
        assert_eq!(labels.len(), headers.len());
    }

    #[test]
    fn blank_column_gets_synthetic_label() {
        let mut grid = MemoryGrid::new();
        let sheet = grid.sheet_mut("Gap");
        sheet.set_text(1, 1, "Name");
        sheet.set_text(1, 3, "Score");
        sheet.set_text(1, 4, "Notes");
        sheet.set(2, 2, crate::grid::CellValue::Int(9));
        let (merges, detection) = analyze(&grid, "Gap");
        let headers =
            resolve_headers(&grid, "Gap", &merges, &detection, MultiLevelPolicy::LowerWins)
                .unwrap();
        assert_eq!(headers[&2], "Column 2");
    }

    #[test]
    fn synthetic_header_covers_populated_columns_only() {
        let mut grid = MemoryGrid::new();
        let sheet = grid.sheet_mut("Raw");
        for row in 1..=2 {
            sheet.set(row, 1, crate::grid::CellValue::Int(row as i64));
            sheet.set(row, 3, crate::grid::CellValue::Float(0.5));
        }
        let (merges, detection) = analyze(&grid, "Raw");
        assert!(detection.has_synthetic_header());
        let headers =
            resolve_headers(&grid, "Raw", &merges, &detection, MultiLevelPolicy::LowerWins)
                .unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[&1], "Column 1");
        assert_eq!(headers[&3], "Column 3");
    }
}
