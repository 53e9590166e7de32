use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("There is zero AOI in {0}")]
    NoRegions(PathBuf),

    #[error("Parallel download limit must be at least 1")]
    InvalidParallelism,

    #[error("Download of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    #[error("Gave up waiting for {what} after {}s", waited.as_secs())]
    DeadlineExceeded { what: String, waited: Duration },

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("No file name in url: {0}")]
    InvalidFileName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Unable to clone an outgoing S3 request while rewriting its uri
#[derive(Error, Debug)]
pub enum MapError {
    #[error("Unable to clone request")]
    Clone,
}
