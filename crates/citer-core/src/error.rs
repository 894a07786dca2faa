//! Error types for citer-core

use std::path::PathBuf;
use thiserror::Error;

pub use crate::sources::SourceError;

/// Result type alias for citer operations
pub type Result<T> = std::result::Result<T, CiterError>;

/// Main error type for citer operations
#[derive(Error, Debug)]
pub enum CiterError {
    /// Settings could not be loaded or are inconsistent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bibliography file exists but could not be read
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A remote provider call failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing a new entry failed; nothing was inserted
    #[error("Append error: {0}")]
    Append(#[from] AppendError),
}

/// Configuration errors abort initialization
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Only one output bibliography file may be set, got {0}")]
    MultipleOutputPaths(usize),

    #[error("Output bibliography {0} is not one of the input bibliography files")]
    OutputNotAmongInputs(PathBuf),

    #[error("Citation format {0:?} has no %s slot for the key")]
    MissingKeySlot(String),

    #[error("Invalid citation regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Reading a bibliography file failed for a reason other than absence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append failures; the output file is left as it was
#[derive(Error, Debug)]
pub enum AppendError {
    #[error("No output bibliography file is configured")]
    NoOutputPath,

    #[error("Could not open {path} for appending: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write entry {key} to {path}: {source}")]
    Write {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
