//! Listing fetch and parse stage
//!
//! This module handles the first stage of an ingestion cycle:
//! - Building HTTP clients with proper user agent strings
//! - Fetching the listing page from the content source
//! - Parsing item nodes out of the listing HTML
//! - Upgrading preview image URLs to their full-size variants

mod client;
mod listing;
mod parser;

pub use client::build_http_client;
pub use listing::{fetch_listing, upgrade_image_url};
pub use parser::{derive_source_id, parse_listing, CandidateItem, ParsedListing};

use thiserror::Error;

/// Errors that can occur during the fetch stage
#[derive(Debug, Error)]
pub enum FetchError {
    /// The listing page could not be retrieved at all. This aborts the
    /// cycle; individual item parse problems do not.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single item node could not be parsed into a candidate
    #[error("Item parse error: {0}")]
    ItemParse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Returns true if the whole source is unreachable (cycle-fatal)
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            Self::SourceUnavailable(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::ItemParse(_) => false,
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
