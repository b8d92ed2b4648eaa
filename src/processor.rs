//! # Workbook Processor
//!
//! The top of the pipeline: opens a grid source, runs structure analysis and
//! streaming extraction over each selected sheet, and assembles per-sheet
//! results. A sheet with malformed structure is skipped with a warning; the
//! rest of the workbook still processes.
use crate::checkpoint::{Checkpoint, CheckpointManager, SourceIdentity};
use crate::config::{ConfigError, ProcessorConfig};
use crate::error::{Result, ResultMessage, SheetStreamError};
use crate::extract::HierarchicalRecord;
use crate::grid::GridSource;
use crate::output::{OutputFormatter, SheetResult};
use crate::stream::{ChunkCoordinator, RecordSink, StepOutcome, StreamState, VecSink};
use crate::structure::{detect, resolve_headers, HeaderMap, MergeMap};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Everything a processing run produced.
#[derive(Debug, Default)]
pub struct WorkbookOutcome {
    pub sheets: IndexMap<String, SheetResult>,
    /// Sheets skipped for malformed structure.
    pub skipped: Vec<String>,
    pub run_started_at: i64,
}

impl WorkbookOutcome {
    pub fn to_document(&self, formatter: &OutputFormatter) -> Value {
        formatter.format_workbook(self.sheets.iter().map(|(name, result)| (name.as_str(), result)))
    }
}

/// Runs the full pipeline over one workbook.
pub struct WorkbookProcessor<'a, G: GridSource> {
    grid: &'a mut G,
    config: &'a ProcessorConfig,
    source: SourceIdentity,
}

impl<'a, G: GridSource> WorkbookProcessor<'a, G> {
    pub fn new(
        grid: &'a mut G,
        config: &'a ProcessorConfig,
        source: SourceIdentity,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            grid,
            config,
            source,
        })
    }

    /// Formatter matching this run's configuration.
    pub fn formatter(&self) -> OutputFormatter {
        OutputFormatter {
            flatten: self.config.flatten_output,
            ..OutputFormatter::default()
        }
    }

    /// Processes every selected sheet from the top. On success the run's
    /// checkpoints are deleted; they only outlive a failed run.
    pub fn process(&mut self) -> Result<WorkbookOutcome> {
        self.grid
            .open()
            .map_err(SheetStreamError::from)
            .with_prefix("opening grid source")?;
        let outcome = self.process_open();
        self.grid.close();
        outcome
    }

    /// Resumes one sheet from a saved checkpoint, returning only the records
    /// produced after the suspension point.
    pub fn resume_sheet(&mut self, checkpoint_id: &str) -> Result<SheetResult> {
        let dir = self.config.checkpoint_dir.as_ref().ok_or_else(|| {
            ConfigError::Invalid {
                field: "checkpoint_dir".to_owned(),
                message: "required to resume from a checkpoint".to_owned(),
            }
        })?;
        let manager = CheckpointManager::new(dir)?;
        let checkpoint = manager.load_validated(checkpoint_id, &self.source)?;
        info!(
            checkpoint = checkpoint_id,
            sheet = %checkpoint.state.sheet_name,
            next_row = checkpoint.state.next_row,
            "resuming from checkpoint"
        );
        self.grid
            .open()
            .map_err(SheetStreamError::from)
            .with_prefix("opening grid source")?;
        let outcome = self.resume_open(&manager, checkpoint);
        self.grid.close();
        outcome
    }

    fn process_open(&mut self) -> Result<WorkbookOutcome> {
        let run_started_at = Utc::now().timestamp();
        let manager = match &self.config.checkpoint_dir {
            Some(dir) => Some(CheckpointManager::new(dir)?),
            None => None,
        };

        let mut outcome = WorkbookOutcome {
            run_started_at,
            ..WorkbookOutcome::default()
        };
        for sheet in self.grid.sheet_names() {
            if !self.config.accepts_sheet(&sheet) {
                debug!(sheet = %sheet, "sheet filtered out");
                continue;
            }
            match self.process_sheet(&sheet, manager.as_ref(), run_started_at) {
                Ok(result) => {
                    outcome.sheets.insert(sheet, result);
                }
                Err(SheetStreamError::StructuralError(error)) => {
                    warn!(sheet = %sheet, %error, "malformed sheet structure, skipping");
                    outcome.skipped.push(sheet);
                }
                Err(error) => return Err(error),
            }
        }

        if let Some(manager) = &manager {
            let removed = manager.cleanup_run(run_started_at)?;
            if removed > 0 {
                debug!(removed, "removed finished-run checkpoints");
            }
        }
        Ok(outcome)
    }

    fn process_sheet(
        &self,
        sheet: &str,
        manager: Option<&CheckpointManager>,
        run_started_at: i64,
    ) -> Result<SheetResult> {
        let grid = &*self.grid;
        let dims = grid.dimensions(sheet)?;
        let merges = MergeMap::build(sheet, &dims, grid.merged_regions(sheet)?)?;
        let detection = detect(grid, sheet, &merges, &self.config.detect_options())?;
        let headers =
            resolve_headers(grid, sheet, &merges, &detection, self.config.header_policy)?;

        if headers.is_empty() || detection.data_start_row > dims.max_row {
            info!(sheet, "no data rows, emitting structure only");
            return Ok(SheetResult {
                headers,
                metadata: detection.metadata,
                records: Vec::new(),
            });
        }

        let state = StreamState::new(
            sheet,
            detection.data_start_row,
            dims.max_row,
            self.config.stream_options().chunk_size,
        );
        let records =
            self.stream_rows(grid, sheet, &headers, &merges, state, manager, run_started_at)?;
        Ok(SheetResult {
            headers,
            metadata: detection.metadata,
            records,
        })
    }

    fn resume_open(
        &mut self,
        manager: &CheckpointManager,
        checkpoint: Checkpoint,
    ) -> Result<SheetResult> {
        let grid = &*self.grid;
        let sheet = checkpoint.state.sheet_name.clone();
        let dims = grid.dimensions(&sheet)?;
        let merges = MergeMap::build(&sheet, &dims, grid.merged_regions(&sheet)?)?;
        let detection = detect(grid, &sheet, &merges, &self.config.detect_options())?;
        let headers =
            resolve_headers(grid, &sheet, &merges, &detection, self.config.header_policy)?;
        let records = self.stream_rows(
            grid,
            &sheet,
            &headers,
            &merges,
            checkpoint.state,
            Some(manager),
            checkpoint.run_started_at,
        )?;
        Ok(SheetResult {
            headers,
            metadata: detection.metadata,
            records,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn stream_rows(
        &self,
        grid: &G,
        sheet: &str,
        headers: &HeaderMap,
        merges: &MergeMap,
        state: StreamState,
        manager: Option<&CheckpointManager>,
        run_started_at: i64,
    ) -> Result<Vec<HierarchicalRecord>> {
        let mut sink = VecSink::default();
        let mut coordinator = ChunkCoordinator::with_state(
            grid,
            sheet,
            headers,
            merges,
            self.config.extract_options(),
            self.config.stream_options(),
            state,
            &mut sink,
        );
        loop {
            match coordinator.step()? {
                StepOutcome::Processed { .. } => {}
                StepOutcome::CheckpointDue { .. } => {
                    if let Some(manager) = manager {
                        let checkpoint = Checkpoint::new(
                            self.source.clone(),
                            run_started_at,
                            coordinator.state().clone(),
                            coordinator.sink().progress_marker(),
                        );
                        let path = manager.save(&checkpoint)?;
                        debug!(
                            id = %checkpoint.checkpoint_id,
                            path = %path.display(),
                            "checkpoint saved"
                        );
                    }
                }
                StepOutcome::Finished { records_emitted } => {
                    info!(sheet, records_emitted, "sheet extraction complete");
                    break;
                }
            }
        }
        drop(coordinator);
        Ok(sink.records)
    }
}
