//! Error types for the readprop library

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadPropError {
    /// The alignment input cannot be used at all; nothing was processed.
    #[error("Input {path} is unusable: {reason}")]
    Precondition { path: PathBuf, reason: String },

    /// A single bin could not be processed, which invalidates the whole run.
    #[error("Bin {bin} failed: {source:#}")]
    WorkerFailure {
        bin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing interrupted: {0}")]
    Interrupted(String),
}

impl ReadPropError {
    pub fn precondition<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        ReadPropError::Precondition {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn output<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        ReadPropError::Output {
            path: path.into(),
            source,
        }
    }

    /// Stable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadPropError::Precondition { .. } => "precondition",
            ReadPropError::WorkerFailure { .. } => "worker-failure",
            ReadPropError::Output { .. } => "output",
            ReadPropError::Input { .. } => "input",
            ReadPropError::Config(_) => "config",
            ReadPropError::Interrupted(_) => "interrupted",
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReadPropError::Precondition { .. }
            | ReadPropError::Input { .. }
            | ReadPropError::Config(_) => 2,
            ReadPropError::WorkerFailure { .. } | ReadPropError::Interrupted(_) => 3,
            ReadPropError::Output { .. } => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReadPropError>;
