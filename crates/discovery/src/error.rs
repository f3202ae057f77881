//! Error types for the poll cycle
//!
//! None of these escape a single cycle except [`PollerError`], which is raised
//! while constructing or starting the poller and is fatal.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a response body from the discovery endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The fetched body is not a usable target group list.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("response is not a list of target groups: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(
        "discovery endpoint returned {count} target group(s); 0 or 1 usually means the \
         discovery source lost its own inventory, keeping the current target file"
    )]
    Degenerate { count: usize },
}

/// Failure to replace the target file.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode target groups: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("write task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors that stop the loop from ever ticking.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("poll interval must be positive")]
    ZeroInterval,

    #[error("poll interval {interval:?} is too large to schedule")]
    IntervalTooLarge { interval: Duration },

    #[error("invalid target url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
