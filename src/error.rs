/// Error types for the loading pipeline and its collaborators
///
/// Loading failures never escape the pipeline as `Err` values: a failed
/// decode is delivered to the caller as an absent resource and published as
/// a `LoadEvent::Failed`. The enums below cover the places where an explicit
/// error state is surfaced instead (configuration, the mark store and the
/// folder library), plus the provider-side decode errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::TaskKey;

/// Errors from the priority load queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("task {0} is already queued")]
    Duplicate(TaskKey),
    #[error("load queue is empty")]
    Empty,
}

/// Errors a decode provider can report for a single request
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("no embedded JPEG found in {0}")]
    NoEmbeddedPreview(PathBuf),
    #[error("unsupported media: {0}")]
    Unsupported(PathBuf),
    #[error("decode worker stopped: {0}")]
    Worker(String),
}

/// Errors while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors from the mark store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare store location {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine user data directory")]
    NoDataDir,
    #[error("mark store is closed")]
    Closed,
    #[error("unknown mark status code {0}")]
    UnknownStatus(i64),
    #[error("background store task failed: {0}")]
    Join(String),
}

/// Errors from the asset library (enumeration, video lookup, deletion)
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library root does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset not found: {0}")]
    NotFound(String),
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("index {index} out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
