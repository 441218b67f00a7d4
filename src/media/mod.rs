//! Media download stage
//!
//! This module downloads an item's media set with bounded concurrency,
//! exponential-backoff retries, and all-or-nothing staging: artifacts only
//! land in the artifact directory once every file in the set succeeded.

mod backoff;
mod fetcher;

pub use backoff::{RetryPolicy, RetrySchedule};
pub use fetcher::{MediaArtifact, MediaFetcher, MediaSet};

use thiserror::Error;

/// Errors that can occur while downloading media
#[derive(Debug, Error)]
pub enum MediaError {
    /// A failure worth retrying (timeout, connect error, 5xx, 429)
    #[error("Transient download failure: {0}")]
    Transient(String),

    /// A failure retrying cannot fix (4xx other than 429, wrong content)
    #[error("Permanent download failure: {0}")]
    Permanent(String),

    /// All attempts for a file were consumed
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;
