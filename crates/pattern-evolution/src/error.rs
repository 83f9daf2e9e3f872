//! Error types for the evolution loop
//!
//! Each component has its own error enum; the orchestrator wraps them in
//! [`AutofixError`] at its boundary.

use std::path::PathBuf;
use thiserror::Error;
use validation_engine::ValidationError;

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("unsupported mutation action: {0:?}")]
    UnsupportedAction(String),

    #[error("mutation is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid regex for override {id}: {source}")]
    InvalidRegex {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("override id already exists: {0}")]
    DuplicateId(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern or mutation JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("path is outside the allowed roots: {}", .0.display())]
    PathNotAllowed(PathBuf),

    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error("run {0} has been restored; no further writes are accepted")]
    RunRestored(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction failed for {}: {message}", .source_path.display())]
    Failed { source_path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("suggestion service failed: {0}")]
    Service(String),

    #[error("reply did not contain a JSON object or array")]
    Unparseable,
}

#[derive(Error, Debug)]
pub enum AutofixError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Suggestion(#[from] SuggestionError),

    #[error("re-extraction failed for {failed} of {total} source(s)")]
    IncompleteExtraction { failed: usize, total: usize },

    #[error("quality command could not be started: {command}: {source}")]
    QualityCommand {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
