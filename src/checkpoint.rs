//! # Checkpoint Module
//!
//! Durable snapshots of streaming progress. A checkpoint captures the full
//! [`StreamState`] plus the identity of the source workbook, so a later
//! process can resume mid-sheet, but only against the same file contents.
//! Saves are atomic: a checkpoint file on disk is always complete.
use crate::stream::StreamState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint '{id}' not found")]
    NotFound { id: String },

    #[error("checkpoint '{id}' does not match the workbook: {reason}")]
    ResumeMismatch { id: String, reason: String },

    #[error("checkpoint could not be persisted: {0}")]
    Persist(String),
}

/// Identity of the workbook a checkpoint belongs to. The fingerprint is a
/// content hash, so a touched-but-unchanged file still resumes while an
/// edited one is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub path: String,
    pub fingerprint: String,
}

impl SourceIdentity {
    pub fn for_file(path: &Path) -> Result<Self, CheckpointError> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            fingerprint: format!("{:x}", hasher.finalize()),
        })
    }

    /// For sources without a backing file (in-memory grids, tests).
    pub fn from_parts(path: &str, content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self {
            path: path.to_owned(),
            fingerprint: format!("{:x}", hasher.finalize()),
        }
    }
}

/// One saved snapshot. `run_started_at` pins the run so two runs over the
/// same workbook never collide on ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub source: SourceIdentity,
    pub created_at: DateTime<Utc>,
    pub run_started_at: i64,
    pub state: StreamState,
    /// Sink progress marker captured alongside the state.
    pub output_progress: String,
}

impl Checkpoint {
    pub fn new(
        source: SourceIdentity,
        run_started_at: i64,
        state: StreamState,
        output_progress: String,
    ) -> Self {
        let checkpoint_id = Self::id_for(&source, run_started_at, state.chunk_index);
        Self {
            checkpoint_id,
            source,
            created_at: Utc::now(),
            run_started_at,
            state,
            output_progress,
        }
    }

    /// Deterministic id: same source, run, and chunk always name the same
    /// checkpoint, so a retried save overwrites instead of accumulating.
    fn id_for(source: &SourceIdentity, run_started_at: i64, chunk_index: u32) -> String {
        let stem = Path::new(&source.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_owned());
        let stem: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!(
            "cp_{}_{}_{}_{:05}",
            stem,
            &source.fingerprint[..8],
            run_started_at,
            chunk_index
        )
    }
}

/// Owns one checkpoint directory. File layout: `{checkpoint_id}.checkpoint`,
/// JSON body, written atomically via a temp file in the same directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.checkpoint", id))
    }

    /// Atomic save: serialize to a temp file in the checkpoint directory,
    /// then rename over the final name.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        let body = serde_json::to_vec_pretty(checkpoint)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut temp, &body)?;
        let target = self.path_for(&checkpoint.checkpoint_id);
        temp.persist(&target)
            .map_err(|error| CheckpointError::Persist(error.to_string()))?;
        Ok(target)
    }

    pub fn load(&self, id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(CheckpointError::NotFound { id: id.to_owned() });
        }
        let body = fs::read(&path)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Loads a checkpoint and verifies it belongs to `source`. Resuming
    /// against a modified workbook would silently corrupt output, so any
    /// identity mismatch is an error, not a warning.
    pub fn load_validated(
        &self,
        id: &str,
        source: &SourceIdentity,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = self.load(id)?;
        if checkpoint.source.fingerprint != source.fingerprint {
            return Err(CheckpointError::ResumeMismatch {
                id: id.to_owned(),
                reason: "workbook contents changed since the checkpoint was written".to_owned(),
            });
        }
        Ok(checkpoint)
    }

    /// All readable checkpoints in the directory, sorted by id. Files that
    /// fail to parse are skipped with a warning rather than failing the scan.
    pub fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("checkpoint") {
                continue;
            }
            match fs::read(&path).map_err(CheckpointError::from).and_then(
                |body| Ok(serde_json::from_slice::<Checkpoint>(&body)?),
            ) {
                Ok(checkpoint) => found.push(checkpoint),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable checkpoint");
                }
            }
        }
        found.sort_by(|a, b| a.checkpoint_id.cmp(&b.checkpoint_id));
        Ok(found)
    }

    pub fn delete(&self, id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(CheckpointError::NotFound { id: id.to_owned() });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Removes every checkpoint belonging to one finished run.
    pub fn cleanup_run(&self, run_started_at: i64) -> Result<usize, CheckpointError> {
        let mut removed = 0;
        for checkpoint in self.list()? {
            if checkpoint.run_started_at == run_started_at {
                self.delete(&checkpoint.checkpoint_id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
