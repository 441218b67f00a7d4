//! HTTP client construction
//!
//! One client instance is shared by the listing fetcher and the media
//! downloader; reqwest pools connections internally.

use crate::config::SourceConfig;
use reqwest::Client;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The content source configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}
