//! # Structure Analysis Module
//!
//! Turns the raw geometry of a sheet into something extraction can use:
//! an indexed merge map, the classification of leading rows into metadata
//! versus header, and one resolved label per data column.
pub(crate) mod header;
pub(crate) mod merge;
pub(crate) mod metadata;
pub(crate) mod position;

pub use header::{resolve_headers, HeaderMap, MultiLevelPolicy};
pub use merge::MergeMap;
pub use metadata::{detect, DetectOptions, MetadataDetectionResult, MetadataItem};
pub use position::{cell_reference, column_letter, CellPosition, CellRange, MergeKind, MergedRegion};

use crate::grid::Dimensions;
use thiserror::Error;

/// Data-integrity defects in the source sheet's geometry. Fatal for the
/// current sheet, never repaired; other sheets continue processing.
#[derive(Error, Debug)]
pub enum StructuralError {
    #[error("sheet '{sheet}': merge regions {first} and {second} overlap")]
    OverlappingMerge {
        sheet: String,
        first: CellRange,
        second: CellRange,
    },

    #[error("sheet '{sheet}': merge region {range} exceeds sheet bounds ({dims})")]
    MergeOutOfBounds {
        sheet: String,
        range: CellRange,
        dims: Dimensions,
    },
}
