//! # Streaming Module
//!
//! Drives extraction chunk by chunk so an arbitrarily tall sheet is processed
//! in bounded memory. The coordinator owns a serializable [`StreamState`];
//! suspending after any chunk and resuming from the saved state yields the
//! same record sequence as an uninterrupted pass.
pub(crate) mod coordinator;
pub(crate) mod state;

pub use coordinator::{ChunkCoordinator, Phase, StepOutcome, StreamOptions};
pub use state::StreamState;

use crate::error::Result;
use crate::extract::HierarchicalRecord;

/// Destination for completed records. Records arrive in final order, exactly
/// once each; the sink is never handed a partially built parent group.
pub trait RecordSink {
    fn emit(&mut self, record: &HierarchicalRecord) -> Result<()>;

    /// Opaque token describing how far the sink's output has durably
    /// advanced. Stored inside checkpoints so a resumed run can line its
    /// output up with what was already written.
    fn progress_marker(&self) -> String {
        String::new()
    }
}

/// In-memory sink, used by tests and by whole-workbook formatting.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<HierarchicalRecord>,
}

impl RecordSink for VecSink {
    fn emit(&mut self, record: &HierarchicalRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn progress_marker(&self) -> String {
        self.records.len().to_string()
    }
}
