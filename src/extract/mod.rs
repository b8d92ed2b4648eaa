//! # Hierarchical Extraction Module
//!
//! Walks data rows and reconstitutes the parent/child relationships encoded
//! by merged cells: vertical merges open a parent grouping over several rows,
//! horizontal merges carry compound values at one hierarchy level. The
//! extractor always produces the nested shape; flattening belongs to the
//! output formatter.
pub(crate) mod extractor;
pub(crate) mod record;

pub use extractor::{ExtractOptions, HierarchicalExtractor, ParentContext};
pub use record::HierarchicalRecord;
