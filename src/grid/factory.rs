use crate::grid::GridContentionError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Reading strategy behind a grid source. Either strategy must produce
/// identical merge maps and record sequences for the same input; the choice
/// only trades memory against speed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GridStrategy {
    /// Full in-memory load; required whenever merged structures are present
    /// and preferred for small files.
    Structured,
    /// Row-at-a-time reading for large flat tables without merges.
    Flat,
}

/// Threshold above which a merge-free workbook is read row-at-a-time.
const FLAT_SIZE_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Decision table selecting the reading strategy for a workbook.
pub fn select_strategy(file_size: u64, merge_count: usize) -> GridStrategy {
    if merge_count > 0 || file_size < FLAT_SIZE_THRESHOLD {
        GridStrategy::Structured
    } else {
        GridStrategy::Flat
    }
}

/// Paths currently held by a live lease.
static OPEN_FILES: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive-ownership token for one workbook file. Acquire before opening a
/// grid source on the path; dropping the lease releases the file.
#[derive(Debug)]
pub struct GridLease {
    path: PathBuf,
}

impl GridLease {
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, GridContentionError> {
        let path = path.as_ref().to_path_buf();
        let mut open = OPEN_FILES.lock();
        if !open.insert(path.clone()) {
            return Err(GridContentionError {
                path: path.display().to_string(),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GridLease {
    fn drop(&mut self) {
        OPEN_FILES.lock().remove(&self.path);
    }
}
