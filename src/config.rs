//! # Configuration Module
//!
//! Processor settings with layered loading: defaults, then a JSON document,
//! then `SHEETSTREAM_*` environment variables, each layer overriding the one
//! below. A configuration is validated once, up front; invalid settings never
//! reach the pipeline.
use crate::extract::ExtractOptions;
use crate::stream::StreamOptions;
use crate::structure::{DetectOptions, MultiLevelPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {key}: {message}")]
    Env { key: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        message: message.into(),
    }
}

/// Every knob of a processing run. Field defaults match an unconfigured run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Glob patterns selecting sheets to process. Empty selects every sheet.
    pub sheet_names: Vec<String>,
    /// Rows scanned for metadata before giving up on finding a header.
    pub metadata_max_rows: u32,
    /// Populated label cells required to call a row a header.
    pub header_detection_threshold: usize,
    pub multi_level_header_detection: bool,
    pub header_policy: MultiLevelPolicy,
    pub include_empty_cells: bool,
    pub flatten_output: bool,
    pub chunk_size: usize,
    /// When false the whole sheet is processed as one chunk.
    pub streaming: bool,
    pub checkpoint_interval: u32,
    pub checkpoint_dir: Option<PathBuf>,
    /// Checkpoint id to resume from instead of starting fresh.
    pub resume_from: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sheet_names: Vec::new(),
            metadata_max_rows: 6,
            header_detection_threshold: 3,
            multi_level_header_detection: true,
            header_policy: MultiLevelPolicy::default(),
            include_empty_cells: false,
            flatten_output: false,
            chunk_size: 1000,
            streaming: true,
            checkpoint_interval: 5,
            checkpoint_dir: None,
            resume_from: None,
        }
    }
}

impl ProcessorConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SHEETSTREAM_*` overrides on top of the current values, then
    /// re-validates.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_var("SHEETSTREAM_SHEET_NAMES") {
            self.sheet_names = value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(value) = env_var("SHEETSTREAM_METADATA_MAX_ROWS") {
            self.metadata_max_rows = parse_env("SHEETSTREAM_METADATA_MAX_ROWS", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_HEADER_THRESHOLD") {
            self.header_detection_threshold = parse_env("SHEETSTREAM_HEADER_THRESHOLD", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_MULTI_LEVEL_HEADERS") {
            self.multi_level_header_detection =
                parse_bool("SHEETSTREAM_MULTI_LEVEL_HEADERS", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_HEADER_POLICY") {
            self.header_policy = match value.as_str() {
                "lower_wins" => MultiLevelPolicy::LowerWins,
                "upper_wins" => MultiLevelPolicy::UpperWins,
                other => {
                    return Err(ConfigError::Env {
                        key: "SHEETSTREAM_HEADER_POLICY".to_owned(),
                        message: format!("unknown policy '{}'", other),
                    })
                }
            };
        }
        if let Some(value) = env_var("SHEETSTREAM_INCLUDE_EMPTY_CELLS") {
            self.include_empty_cells = parse_bool("SHEETSTREAM_INCLUDE_EMPTY_CELLS", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_FLATTEN_OUTPUT") {
            self.flatten_output = parse_bool("SHEETSTREAM_FLATTEN_OUTPUT", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_CHUNK_SIZE") {
            self.chunk_size = parse_env("SHEETSTREAM_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_STREAMING") {
            self.streaming = parse_bool("SHEETSTREAM_STREAMING", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_CHECKPOINT_INTERVAL") {
            self.checkpoint_interval = parse_env("SHEETSTREAM_CHECKPOINT_INTERVAL", &value)?;
        }
        if let Some(value) = env_var("SHEETSTREAM_CHECKPOINT_DIR") {
            self.checkpoint_dir = Some(PathBuf::from(value));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be at least 1"));
        }
        if self.header_detection_threshold == 0 {
            return Err(invalid("header_detection_threshold", "must be at least 1"));
        }
        if self.metadata_max_rows == 0 {
            return Err(invalid("metadata_max_rows", "must be at least 1"));
        }
        if self.checkpoint_interval == 0 && self.checkpoint_dir.is_some() {
            return Err(invalid(
                "checkpoint_interval",
                "must be at least 1 when a checkpoint directory is set",
            ));
        }
        if self.resume_from.is_some() && self.checkpoint_dir.is_none() {
            return Err(invalid(
                "resume_from",
                "requires checkpoint_dir to locate the checkpoint",
            ));
        }
        // Surface bad globs at load time, not per sheet.
        self.sheet_patterns()
            .map_err(|error| invalid("sheet_names", error.to_string()))?;
        Ok(())
    }

    pub fn sheet_patterns(&self) -> Result<Vec<glob::Pattern>, glob::PatternError> {
        self.sheet_names.iter().map(|p| glob::Pattern::new(p)).collect()
    }

    /// Whether a sheet name passes the configured filters. An empty filter
    /// list accepts everything.
    pub fn accepts_sheet(&self, name: &str) -> bool {
        if self.sheet_names.is_empty() {
            return true;
        }
        // Patterns validated up front, so failures here mean validate() was
        // skipped; treat the bad pattern as non-matching.
        self.sheet_names
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .any(|pattern| pattern.matches(name))
    }

    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            max_metadata_rows: self.metadata_max_rows,
            header_threshold: self.header_detection_threshold,
            multi_level_headers: self.multi_level_header_detection,
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            include_empty_cells: self.include_empty_cells,
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            chunk_size: if self.streaming { self.chunk_size } else { usize::MAX },
            checkpoint_interval: if self.checkpoint_dir.is_some() {
                self.checkpoint_interval
            } else {
                0
            },
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|error: T::Err| ConfigError::Env {
        key: key.to_owned(),
        message: error.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Env {
            key: key.to_owned(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    /// The environment is process-global and `with_env_overrides` reads every
    /// `SHEETSTREAM_*` key, so tests touching it must run one at a time.
    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[test]
    fn defaults_validate() {
        let config = ProcessorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.metadata_max_rows, 6);
        assert_eq!(config.header_detection_threshold, 3);
        assert_eq!(config.chunk_size, 1000);
        assert!(config.accepts_sheet("anything"));
    }

    #[test]
    fn json_overrides_and_unknown_fields_fail() {
        let config = ProcessorConfig::from_json(
            r#"{"sheet_names": ["Production*"], "chunk_size": 250, "flatten_output": true}"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 250);
        assert!(config.flatten_output);
        assert!(config.accepts_sheet("Production 2024"));
        assert!(!config.accepts_sheet("Summary"));

        assert!(ProcessorConfig::from_json(r#"{"chunk_sizes": 4}"#).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = ProcessorConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.sheet_names = vec!["[".to_owned()];
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.resume_from = Some("cp_x".to_owned());
        assert!(config.validate().is_err());
        config.checkpoint_dir = Some(PathBuf::from("/tmp/cps"));
        config.validate().unwrap();
    }

    #[test]
    fn stream_options_follow_checkpoint_dir() {
        let mut config = ProcessorConfig::default();
        assert_eq!(config.stream_options().checkpoint_interval, 0);
        config.checkpoint_dir = Some(PathBuf::from("/tmp/cps"));
        assert_eq!(config.stream_options().checkpoint_interval, 5);

        config.streaming = false;
        assert_eq!(config.stream_options().chunk_size, usize::MAX);
    }

    #[test]
    fn env_overrides_apply_on_top() {
        let _env = ENV_LOCK.lock();
        std::env::set_var("SHEETSTREAM_CHUNK_SIZE", "128");
        std::env::set_var("SHEETSTREAM_HEADER_POLICY", "upper_wins");
        std::env::set_var("SHEETSTREAM_INCLUDE_EMPTY_CELLS", "yes");
        let config = ProcessorConfig::default().with_env_overrides().unwrap();
        std::env::remove_var("SHEETSTREAM_CHUNK_SIZE");
        std::env::remove_var("SHEETSTREAM_HEADER_POLICY");
        std::env::remove_var("SHEETSTREAM_INCLUDE_EMPTY_CELLS");

        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.header_policy, MultiLevelPolicy::UpperWins);
        assert!(config.include_empty_cells);
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let _env = ENV_LOCK.lock();
        std::env::set_var("SHEETSTREAM_STREAMING", "maybe");
        let error = ProcessorConfig::default().with_env_overrides().unwrap_err();
        std::env::remove_var("SHEETSTREAM_STREAMING");
        assert!(error.to_string().contains("SHEETSTREAM_STREAMING"));
    }

    #[test]
    fn env_mutation_is_serialized_across_threads() {
        let workers: Vec<_> = (0..4)
            .map(|index| {
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _env = ENV_LOCK.lock();
                        if index % 2 == 0 {
                            std::env::set_var("SHEETSTREAM_STREAMING", "maybe");
                            assert!(ProcessorConfig::default().with_env_overrides().is_err());
                        } else {
                            std::env::set_var("SHEETSTREAM_STREAMING", "off");
                            let config =
                                ProcessorConfig::default().with_env_overrides().unwrap();
                            assert!(!config.streaming);
                        }
                        std::env::remove_var("SHEETSTREAM_STREAMING");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    }
}
