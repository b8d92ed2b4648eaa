use thiserror::Error;

/// Main error type for the sheetstream crate.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum SheetStreamError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    // Third-party library errors
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Configuration errors
    #[error("{0}")]
    ConfigError(#[from] crate::config::ConfigError),

    // Grid module errors
    #[error("{0}")]
    SourceAccessError(#[from] crate::grid::SourceAccessError),

    #[error("{0}")]
    GridContentionError(#[from] crate::grid::GridContentionError),

    // Structure module errors
    #[error("{0}")]
    StructuralError(#[from] crate::structure::StructuralError),

    // Checkpoint module errors
    #[error("{0}")]
    CheckpointError(#[from] crate::checkpoint::CheckpointError),
}

pub type Result<T> = std::result::Result<T, SheetStreamError>;

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetStreamError::WithContextError(format!("{}: {}", message, e)))
    }
}
