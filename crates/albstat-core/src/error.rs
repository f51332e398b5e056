// Error types for configuration and log sources.
// Per-line and per-field problems are not errors: lines are skipped and
// fields degrade to empty/None/0 (see parser).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid pattern in rule '{rule}': {source}")]
    Pattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown schema variant: {0}")]
    UnknownSchema(String),

    #[error("Invalid schema '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled while reading {0}")]
    Cancelled(PathBuf),
}

impl SourceError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            SourceError::Open { path, .. } => path,
            SourceError::Read { path, .. } => path,
            SourceError::Cancelled(path) => path,
        }
    }
}
