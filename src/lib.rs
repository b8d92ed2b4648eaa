//! # SheetStream
//!
//! Structure analysis and hierarchical extraction for spreadsheet grids.
//!
//! Real-world sheets rarely hold clean tables: titles and label/value facts
//! sit above the header, multi-level headers span categories, and merged
//! cells encode parent/child relationships the flat grid loses. SheetStream
//! reads such sheets through the [`grid::GridSource`] capability, classifies
//! their lead rows, resolves one label per column, and streams the data rows
//! through a chunked extractor that turns vertical merges into nested records.
//!
//! ## Pipeline
//!
//! 1. [`structure`]: merge map construction, metadata and header detection,
//!    header label resolution.
//! 2. [`extract`]: hierarchical record extraction from data rows.
//! 3. [`stream`]: chunked coordination with a serializable resume state.
//! 4. [`checkpoint`]: durable snapshots of that state, fingerprint-checked
//!    on resume.
//! 5. [`output`]: nested or flattened JSON rendition.
//!
//! [`processor::WorkbookProcessor`] ties the stages together for whole
//! workbooks; each stage is also usable on its own.
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod grid;
pub mod output;
pub mod processor;
pub mod stream;
pub mod structure;

pub use checkpoint::{Checkpoint, CheckpointManager, SourceIdentity};
pub use config::ProcessorConfig;
pub use error::{Result, SheetStreamError};
pub use extract::{HierarchicalExtractor, HierarchicalRecord};
pub use grid::{CellValue, GridSource, MemoryGrid};
pub use output::{OutputFormatter, SheetResult};
pub use processor::{WorkbookOutcome, WorkbookProcessor};
pub use stream::{ChunkCoordinator, RecordSink, StreamState};
pub use structure::{detect, resolve_headers, HeaderMap, MergeMap, MultiLevelPolicy};
