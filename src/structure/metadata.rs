use crate::error::Result;
use crate::grid::{CellValue, GridSource};
use crate::structure::{CellPosition, MergeMap, MergedRegion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

static NUMERIC_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-?\d+([.,]\d+)?\s*$").expect("Hardcode regex pattern"));

/// True when a text cell holds a plain number, optionally with a decimal
/// separator. Used to tell data-shaped rows from label rows.
pub(crate) fn is_numeric_text(text: &str) -> bool {
    NUMERIC_TEXT.is_match(text)
}

/// Tuning knobs for metadata and header detection.
#[derive(Clone, Debug)]
pub struct DetectOptions {
    /// Rows examined before giving up on finding a header.
    pub max_metadata_rows: u32,
    /// Minimum populated cells for a row to qualify as a header candidate.
    pub header_threshold: usize,
    /// Whether the row below a detected header may form a second header level.
    pub multi_level_headers: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            max_metadata_rows: 6,
            header_threshold: 3,
            multi_level_headers: true,
        }
    }
}

/// One non-tabular fact found above the header.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetadataItem {
    pub label: Option<String>,
    pub value: Value,
    pub row: u32,
}

/// Outcome of scanning a sheet's lead rows. Immutable; produced once per
/// sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataDetectionResult {
    pub metadata: Vec<MetadataItem>,
    /// Physical header rows, top to bottom. Empty when no header was found
    /// and a synthetic header mapping applies instead.
    pub header_rows: Vec<u32>,
    pub data_start_row: u32,
}

impl MetadataDetectionResult {
    pub fn header_row(&self) -> Option<u32> {
        self.header_rows.first().copied()
    }

    pub fn has_synthetic_header(&self) -> bool {
        self.header_rows.is_empty()
    }
}

/// One populated unit of a row: either a plain cell or a merge anchored here.
struct RowUnit {
    col: u32,
    value: CellValue,
    region: Option<Arc<MergedRegion>>,
    styled: bool,
}

struct RowProfile {
    row: u32,
    units: Vec<RowUnit>,
}

impl RowProfile {
    fn styled_count(&self) -> usize {
        self.units.iter().filter(|unit| unit.styled).count()
    }

    /// At least half of the populated units are shaped like data.
    fn is_data_shaped(&self) -> bool {
        if self.units.is_empty() {
            return false;
        }
        let data = self.units.iter().filter(|unit| unit.value.is_data_shaped()).count();
        data * 2 >= self.units.len()
    }
}

fn profile_row<G: GridSource>(
    grid: &G,
    sheet: &str,
    merges: &MergeMap,
    row: u32,
) -> Result<RowProfile> {
    let values = grid.row_values(sheet, row)?;
    let mut units = Vec::new();
    for (col, value) in values {
        let pos = CellPosition::new(row, col);
        match merges.region_at(pos) {
            // Covered cells other than the anchor are logically empty.
            Some(region) if region.anchor() != pos => continue,
            region => {
                if value.is_empty() {
                    continue;
                }
                let styled = grid
                    .cell_style(sheet, row, col)
                    .map(|style| style.bold || style.filled)
                    .unwrap_or(false);
                units.push(RowUnit {
                    col,
                    value,
                    region: region.cloned(),
                    styled,
                });
            }
        }
    }
    // Merge anchors whose cell the source reports as empty still count when
    // the region itself carries a value.
    for region in merges.regions() {
        let anchor = region.anchor();
        if anchor.row == row
            && !region.value.is_empty()
            && !units.iter().any(|unit| unit.col == anchor.col)
        {
            units.push(RowUnit {
                col: anchor.col,
                value: region.value.clone(),
                region: Some(Arc::clone(region)),
                styled: false,
            });
        }
    }
    units.sort_by_key(|unit| unit.col);
    Ok(RowProfile { row, units })
}

fn looks_like_label(value: &CellValue) -> bool {
    match value {
        CellValue::Text(text) => {
            let trimmed = text.trim();
            trimmed.ends_with(':') || (trimmed.len() <= 32 && !is_numeric_text(trimmed))
        }
        _ => false,
    }
}

/// A row wholly explained by one horizontal merge is a title banner.
fn banner_item(profile: &RowProfile) -> Option<MetadataItem> {
    if profile.units.len() != 1 {
        return None;
    }
    let unit = &profile.units[0];
    let region = unit.region.as_ref()?;
    if region.is_horizontal() && region.range.width() > 2 {
        Some(MetadataItem {
            label: None,
            value: cell_to_json(&unit.value, profile.row, unit.col),
            row: profile.row,
        })
    } else {
        None
    }
}

/// Two populated cells where the first reads like a label form a
/// label/value metadata pair. A trailing colon is a strong label signal;
/// without one the second cell must hold a scalar, or a two-cell text row
/// would never survive as a sparse header.
fn label_value_item(profile: &RowProfile) -> Option<MetadataItem> {
    if profile.units.len() != 2 {
        return None;
    }
    let (label_unit, value_unit) = (&profile.units[0], &profile.units[1]);
    let colon_label =
        matches!(&label_unit.value, CellValue::Text(text) if text.trim().ends_with(':'));
    let scalar_value = match &value_unit.value {
        CellValue::Text(text) => is_numeric_text(text),
        CellValue::Empty | CellValue::Error(_) => false,
        _ => true,
    };
    if !(colon_label || (scalar_value && looks_like_label(&label_unit.value))) {
        return None;
    }
    let label = label_unit
        .value
        .label_text()
        .map(|text| text.trim_end_matches(':').trim_end().to_owned())?;
    Some(MetadataItem {
        label: Some(label),
        value: cell_to_json(&value_unit.value, profile.row, value_unit.col),
        row: profile.row,
    })
}

fn is_header_candidate(profile: &RowProfile, threshold: usize) -> bool {
    let populated = profile.units.len();
    if populated >= threshold {
        return true;
    }
    // Style signal may vouch for a row one short of the density threshold.
    populated >= 2 && populated + 1 >= threshold && profile.styled_count() == populated
}

fn cell_to_json(value: &CellValue, row: u32, col: u32) -> Value {
    value.to_json(row, col).unwrap_or(Value::Null)
}

/// Classifies the top rows of a sheet into metadata lines and the header
/// row(s), and locates where tabular data begins.
///
/// Never fails on ambiguous content; only grid access errors propagate.
/// Ties between header and metadata favor metadata.
pub fn detect<G: GridSource>(
    grid: &G,
    sheet: &str,
    merges: &MergeMap,
    options: &DetectOptions,
) -> Result<MetadataDetectionResult> {
    let dims = grid.dimensions(sheet)?;
    let scan_end = dims.max_row.min(options.max_metadata_rows);
    let mut metadata = Vec::new();
    let mut header_rows = Vec::new();

    for row in 1..=scan_end {
        let profile = profile_row(grid, sheet, merges, row)?;
        if profile.units.is_empty() {
            // Empty leading rows are metadata rows with no items.
            continue;
        }
        if let Some(item) = banner_item(&profile) {
            debug!(sheet, row, "classified banner row as metadata");
            metadata.push(item);
            continue;
        }
        if let Some(item) = label_value_item(&profile) {
            debug!(sheet, row, "classified label/value row as metadata");
            metadata.push(item);
            continue;
        }
        if is_header_candidate(&profile, options.header_threshold) {
            header_rows.push(row);
            break;
        }
        // Low-density row: conservative, keep as metadata.
        for unit in &profile.units {
            metadata.push(MetadataItem {
                label: None,
                value: cell_to_json(&unit.value, row, unit.col),
                row,
            });
        }
    }

    let data_start_row = if let Some(&header_row) = header_rows.first() {
        let mut last_header_row = header_row;
        if options.multi_level_headers && header_row < dims.max_row {
            // A second level only exists under a category row, recognized by
            // a horizontal span in the first header row. Without that guard
            // a text-heavy first data row would be absorbed as a header.
            let first = profile_row(grid, sheet, merges, header_row)?;
            let spans_categories = first.units.iter().any(|unit| {
                unit.region
                    .as_ref()
                    .map(|region| region.is_horizontal())
                    .unwrap_or(false)
            });
            // The lower level often only labels the columns under merged
            // spans, so it qualifies one unit short of the threshold.
            let below = profile_row(grid, sheet, merges, header_row + 1)?;
            if spans_categories
                && below.units.len() >= 2
                && below.units.len() + 1 >= options.header_threshold
                && !below.is_data_shaped()
            {
                header_rows.push(header_row + 1);
                last_header_row = header_row + 1;
            }
        }
        last_header_row + 1
    } else {
        // No header within the scan window: fall back to the first
        // data-shaped row and synthesize column labels from it.
        let search_end = dims.max_row.min(scan_end + 5);
        let mut data_row = None;
        for row in 1..=search_end {
            let profile = profile_row(grid, sheet, merges, row)?;
            if !profile.units.is_empty() && profile.is_data_shaped() {
                data_row = Some(row);
                break;
            }
        }
        match data_row {
            Some(row) => {
                // Rows reclassified as data stop being metadata.
                metadata.retain(|item| item.row < row);
                row
            }
            None => scan_end + 1,
        }
    };

    info!(
        sheet,
        metadata_items = metadata.len(),
        header_rows = ?header_rows,
        data_start_row,
        "metadata and header detection complete"
    );
    Ok(MetadataDetectionResult {
        metadata,
        header_rows,
        data_start_row,
    })
}
