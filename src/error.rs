//! Error taxonomy for kmtricks.
//!
//! Mirrors the six-category taxonomy: input, config, I/O, format, memory,
//! and pipeline errors. Each variant carries enough context to print a
//! useful diagnostic without the caller needing to reconstruct it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur anywhere in the kmtricks pipeline.
#[derive(Debug, Error)]
pub enum KmtricksError {
    /// Malformed fof, missing input file, CLI flag out of range.
    #[error("input error: {details}")]
    Input { details: String },

    /// Incompatible `repart-from` (different k, m, or P), or any other
    /// configuration mismatch detected before a run starts.
    #[error("config error: {details}")]
    Config { details: String },

    /// Read/write/open/rename/remove failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Magic or header mismatch on a file opened for read. Fatal for the
    /// task that hit it and cancels the run.
    #[error("format error reading '{path}': {details}")]
    Format { details: String, path: PathBuf },

    /// A partition's required memory exceeds the cap even at max pool
    /// size.
    #[error("memory error: partition {partition} requires {required_bytes} bytes, exceeding the configured cap")]
    Memory {
        partition: u16,
        required_bytes: u64,
    },

    /// Scheduler detected an impossible dependency, e.g. a referenced
    /// partition id >= P.
    #[error("pipeline error: {details}")]
    Pipeline { details: String },

    /// JSON (de)serialization of the run manifest failed.
    #[error("manifest serialization error: {source}")]
    Manifest {
        #[source]
        source: serde_json::Error,
    },
}

impl KmtricksError {
    #[must_use]
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn format(details: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Format {
            details: details.into(),
            path: path.into(),
        }
    }
}

impl From<serde_json::Error> for KmtricksError {
    fn from(source: serde_json::Error) -> Self {
        Self::Manifest { source }
    }
}
