use crate::error::Result;
use crate::extract::{ExtractOptions, HierarchicalExtractor, HierarchicalRecord};
use crate::grid::GridSource;
use crate::stream::{RecordSink, StreamState};
use crate::structure::{HeaderMap, MergeMap};
use tracing::{debug, warn};

/// Chunks never shrink below this, whatever the pressure signal says.
const MIN_CHUNK_ROWS: usize = 64;

/// Streaming knobs, usually derived from the processor configuration.
#[derive(Copy, Clone, Debug)]
pub struct StreamOptions {
    pub chunk_size: usize,
    /// Checkpoint every N chunks; 0 disables the cadence entirely.
    pub checkpoint_interval: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            checkpoint_interval: 5,
        }
    }
}

/// Coordinator lifecycle. `Failed` is terminal; the last saved checkpoint is
/// the recovery point, so a failed step must leave it untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Between chunks; the next `step` pulls a new window.
    Ready,
    ProcessingChunk,
    /// The caller was asked to persist the current state.
    Checkpointing,
    /// Sheet exhausted, open spans being flushed.
    Finalizing,
    Done,
    Failed,
}

/// What one `step` accomplished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// One chunk processed.
    Processed { rows: u32 },
    /// One chunk processed, and the checkpoint cadence says the caller
    /// should persist the current state now.
    CheckpointDue { rows: u32 },
    /// The sheet is exhausted and every open parent span has been flushed.
    Finished { records_emitted: u64 },
}

/// Pulls chunks from a grid source, feeds them through the extractor, and
/// pushes completed records into the sink. All mutable progress lives in the
/// embedded [`StreamState`], which the caller may serialize between steps.
pub struct ChunkCoordinator<'a, G: GridSource, S: RecordSink> {
    grid: &'a G,
    sheet: &'a str,
    extractor: HierarchicalExtractor<'a>,
    sink: &'a mut S,
    state: StreamState,
    checkpoint_interval: u32,
    phase: Phase,
}

impl<'a, G: GridSource, S: RecordSink> ChunkCoordinator<'a, G, S> {
    /// Starts a fresh pass over `data_start_row..=end_row`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grid: &'a G,
        sheet: &'a str,
        headers: &'a HeaderMap,
        merges: &'a MergeMap,
        extract: ExtractOptions,
        stream: StreamOptions,
        data_start_row: u32,
        end_row: u32,
        sink: &'a mut S,
    ) -> Self {
        let state = StreamState::new(sheet, data_start_row, end_row, stream.chunk_size);
        Self::with_state(grid, sheet, headers, merges, extract, stream, state, sink)
    }

    /// Resumes from a previously serialized state. `sheet` must match the
    /// sheet the state was captured on; structural inputs (headers, merges)
    /// are re-derived by the caller from the same workbook.
    #[allow(clippy::too_many_arguments)]
    pub fn with_state(
        grid: &'a G,
        sheet: &'a str,
        headers: &'a HeaderMap,
        merges: &'a MergeMap,
        extract: ExtractOptions,
        stream: StreamOptions,
        state: StreamState,
        sink: &'a mut S,
    ) -> Self {
        let extractor = HierarchicalExtractor::new(sheet, headers, merges, extract);
        Self {
            grid,
            sheet,
            extractor,
            sink,
            state,
            checkpoint_interval: stream.checkpoint_interval,
            phase: Phase::Ready,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read access to the sink, for capturing its progress marker alongside
    /// a checkpoint.
    pub fn sink(&self) -> &S {
        self.sink
    }

    /// Halves the chunk size in response to memory pressure. Takes effect
    /// from the next chunk; already-buffered rows are unaffected.
    pub fn shrink_chunk_size(&mut self) {
        let shrunk = (self.state.chunk_size / 2).max(MIN_CHUNK_ROWS);
        if shrunk < self.state.chunk_size {
            warn!(
                sheet = self.sheet,
                from = self.state.chunk_size,
                to = shrunk,
                "memory pressure, shrinking chunk size"
            );
            self.state.chunk_size = shrunk;
        }
    }

    /// Processes the next chunk. On a grid read failure the coordinator
    /// enters `Failed` without touching the state's progress markers.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.state.is_exhausted() {
            return self.finish();
        }
        self.phase = Phase::ProcessingChunk;

        let span = u32::try_from(self.state.chunk_size).unwrap_or(u32::MAX);
        let chunk_end = self
            .state
            .end_row
            .min(self.state.next_row.saturating_add(span - 1));
        let chunk = match self
            .grid
            .iterate_rows(self.sheet, self.state.next_row, chunk_end, self.state.chunk_size)
            .next()
        {
            Some(Ok(chunk)) => chunk,
            Some(Err(error)) => {
                self.phase = Phase::Failed;
                return Err(error.into());
            }
            None => return self.finish(),
        };

        let rows = chunk.rows.len() as u32;
        let mut completed = Vec::new();
        self.extractor
            .extract_chunk(&chunk, &mut self.state.open_parents, &mut completed);
        self.emit_all(&completed)?;

        self.state.next_row = chunk_end + 1;
        self.state.chunk_index += 1;
        debug!(
            sheet = self.sheet,
            chunk = self.state.chunk_index,
            next_row = self.state.next_row,
            open_parents = self.state.open_parents.len(),
            "chunk processed"
        );

        if self.checkpoint_interval > 0
            && self.state.chunk_index % self.checkpoint_interval == 0
            && !self.state.is_exhausted()
        {
            self.phase = Phase::Checkpointing;
            return Ok(StepOutcome::CheckpointDue { rows });
        }
        self.phase = Phase::Ready;
        Ok(StepOutcome::Processed { rows })
    }

    /// Runs to completion, ignoring checkpoint cadence. For callers that do
    /// not persist state between steps.
    pub fn run(&mut self) -> Result<u64> {
        loop {
            if let StepOutcome::Finished { records_emitted } = self.step()? {
                return Ok(records_emitted);
            }
        }
    }

    fn finish(&mut self) -> Result<StepOutcome> {
        self.phase = Phase::Finalizing;
        let mut completed = Vec::new();
        self.extractor
            .flush(&mut self.state.open_parents, &mut completed);
        self.emit_all(&completed)?;
        self.phase = Phase::Done;
        Ok(StepOutcome::Finished {
            records_emitted: self.state.records_emitted,
        })
    }

    fn emit_all(&mut self, records: &[HierarchicalRecord]) -> Result<()> {
        for record in records {
            if let Err(error) = self.sink.emit(record) {
                self.phase = Phase::Failed;
                return Err(error);
            }
            self.state.records_emitted += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellValue, MemoryGrid};
    use crate::stream::VecSink;
    use crate::structure::CellRange;
    use serde_json::json;

    /// Twelve data rows with a vertical merge over rows 4-9, deliberately
    /// crossing several chunk boundaries.
    fn straddle_grid() -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        let sheet = grid.sheet_mut("Data");
        for row in 1..=12 {
            sheet.set(row, 2, CellValue::Int(100 + row as i64));
        }
        sheet.set_text(4, 1, "GROUP-A");
        sheet.merge(CellRange::new(4, 9, 1, 1));
        grid
    }

    fn headers() -> HeaderMap {
        [(1u32, "Group".to_owned()), (2u32, "Value".to_owned())]
            .into_iter()
            .collect()
    }

    fn merges(grid: &MemoryGrid) -> MergeMap {
        MergeMap::build(
            "Data",
            &grid.dimensions("Data").unwrap(),
            grid.merged_regions("Data").unwrap(),
        )
        .unwrap()
    }

    fn run_with_chunk_size(chunk_size: usize) -> Vec<crate::extract::HierarchicalRecord> {
        let grid = straddle_grid();
        let headers = headers();
        let merges = merges(&grid);
        let mut sink = VecSink::default();
        let stream = StreamOptions {
            chunk_size,
            checkpoint_interval: 0,
        };
        let mut coordinator = ChunkCoordinator::new(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            stream,
            1,
            12,
            &mut sink,
        );
        coordinator.run().unwrap();
        assert_eq!(coordinator.phase(), Phase::Done);
        sink.records
    }

    #[test]
    fn record_sequence_is_invariant_under_chunk_size() {
        let whole = run_with_chunk_size(1000);
        // 6 plain rows plus one group of 6.
        assert_eq!(whole.len(), 7);
        let group = whole
            .iter()
            .find(|record| !record.children.is_empty())
            .unwrap();
        assert_eq!(group.values["Group"], json!("GROUP-A"));
        assert_eq!(group.children.len(), 6);

        for chunk_size in [1, 2, 3, 5, 7, 12] {
            assert_eq!(run_with_chunk_size(chunk_size), whole, "chunk {}", chunk_size);
        }
    }

    #[test]
    fn checkpoint_cadence_fires_every_interval() {
        let grid = straddle_grid();
        let headers = headers();
        let merges = merges(&grid);
        let mut sink = VecSink::default();
        let stream = StreamOptions {
            chunk_size: 2,
            checkpoint_interval: 2,
        };
        let mut coordinator = ChunkCoordinator::new(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            stream,
            1,
            12,
            &mut sink,
        );
        let mut due_at = Vec::new();
        loop {
            match coordinator.step().unwrap() {
                StepOutcome::CheckpointDue { .. } => due_at.push(coordinator.state().chunk_index),
                StepOutcome::Processed { .. } => {}
                StepOutcome::Finished { .. } => break,
            }
        }
        // 6 chunks of 2 rows; the final chunk never reports a checkpoint.
        assert_eq!(due_at, vec![2, 4]);
    }

    #[test]
    fn resume_from_saved_state_matches_uninterrupted_run() {
        let whole = run_with_chunk_size(3);

        let grid = straddle_grid();
        let headers = headers();
        let merges = merges(&grid);
        let stream = StreamOptions {
            chunk_size: 3,
            checkpoint_interval: 1,
        };

        // First leg: stop at the first checkpoint boundary.
        let mut first_sink = VecSink::default();
        let saved = {
            let mut coordinator = ChunkCoordinator::new(
                &grid,
                "Data",
                &headers,
                &merges,
                ExtractOptions::default(),
                stream,
                1,
                12,
                &mut first_sink,
            );
            loop {
                match coordinator.step().unwrap() {
                    StepOutcome::CheckpointDue { .. } => break coordinator.state().clone(),
                    StepOutcome::Processed { .. } => {}
                    StepOutcome::Finished { .. } => panic!("finished before checkpoint"),
                }
            }
        };
        assert_eq!(saved.next_row, 4);

        // Second leg: a brand-new coordinator picks up from the saved state.
        let mut second_sink = VecSink::default();
        let mut resumed = ChunkCoordinator::with_state(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            stream,
            saved,
            &mut second_sink,
        );
        resumed.run().unwrap();

        let mut combined = first_sink.records;
        combined.extend(second_sink.records);
        assert_eq!(combined, whole);
    }

    #[test]
    fn resume_carries_open_parent_across_the_boundary() {
        let grid = straddle_grid();
        let headers = headers();
        let merges = merges(&grid);
        let stream = StreamOptions {
            chunk_size: 5,
            checkpoint_interval: 1,
        };
        let mut sink = VecSink::default();
        let mut coordinator = ChunkCoordinator::new(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            stream,
            1,
            12,
            &mut sink,
        );
        // First chunk covers rows 1-5, inside the 4-9 merge.
        coordinator.step().unwrap();
        let state = coordinator.state();
        assert_eq!(state.open_parents.len(), 1);
        assert_eq!(state.open_parents[0].value, json!("GROUP-A"));
        assert_eq!(state.open_parents[0].end_row, 9);
        assert_eq!(state.open_parents[0].children.len(), 2);
    }

    #[test]
    fn shrink_respects_the_floor() {
        let grid = straddle_grid();
        let headers = headers();
        let merges = merges(&grid);
        let mut sink = VecSink::default();
        let mut coordinator = ChunkCoordinator::new(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            StreamOptions::default(),
            1,
            12,
            &mut sink,
        );
        coordinator.shrink_chunk_size();
        assert_eq!(coordinator.state().chunk_size, 500);
        for _ in 0..10 {
            coordinator.shrink_chunk_size();
        }
        assert_eq!(coordinator.state().chunk_size, MIN_CHUNK_ROWS);
    }

    #[test]
    fn empty_row_span_finishes_immediately() {
        let grid = MemoryGrid::new();
        let headers = HeaderMap::new();
        let merges = MergeMap::default();
        let mut sink = VecSink::default();
        let mut coordinator = ChunkCoordinator::new(
            &grid,
            "Data",
            &headers,
            &merges,
            ExtractOptions::default(),
            StreamOptions::default(),
            5,
            4,
            &mut sink,
        );
        assert_eq!(
            coordinator.step().unwrap(),
            StepOutcome::Finished { records_emitted: 0 }
        );
        assert!(sink.records.is_empty());
    }
}
