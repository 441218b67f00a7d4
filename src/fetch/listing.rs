//! Listing page retrieval
//!
//! Fetches the listing from the content source, parses it, drops items the
//! checkpoint has already passed, and upgrades preview image URLs to their
//! full-size variants.

use crate::config::SourceConfig;
use crate::fetch::parser::{parse_listing, ParsedListing};
use crate::fetch::{FetchError, FetchResult};
use crate::storage::Checkpoint;
use reqwest::Client;
use url::Url;

/// Fetches and parses the listing page
///
/// Returned candidates are in listing order (newest first) and contain only
/// items the checkpoint admits. Preview image URLs are upgraded before the
/// candidates are returned.
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `config` - Content source configuration
/// * `since` - Current checkpoint; items at or below it are dropped
/// * `limit` - Optional cap on candidates returned; keeps the oldest ones
///   so a capped run never leaves a gap below the checkpoint (smoke runs)
///
/// # Returns
///
/// * `Ok(ParsedListing)` - New candidates plus the skipped-node count
/// * `Err(FetchError::SourceUnavailable)` - Listing could not be retrieved
pub async fn fetch_listing(
    client: &Client,
    config: &SourceConfig,
    since: &Checkpoint,
    limit: Option<usize>,
) -> FetchResult<ParsedListing> {
    let base_url = Url::parse(&config.base_url)
        .map_err(|e| FetchError::SourceUnavailable(format!("Bad base URL: {}", e)))?;

    tracing::debug!("Fetching listing from {}", base_url);

    let response = client.get(base_url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::SourceUnavailable("Request timeout".to_string())
        } else if e.is_connect() {
            FetchError::SourceUnavailable("Connection failed".to_string())
        } else {
            FetchError::SourceUnavailable(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::SourceUnavailable(format!(
            "Listing returned HTTP {}",
            status.as_u16()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::SourceUnavailable(e.to_string()))?;

    let mut parsed = parse_listing(&body, &base_url, &config.selectors)?;

    // A listing with zero parseable items means the page structure changed
    // out from under the selectors; treat it like an outage so the
    // checkpoint stays put.
    if parsed.items.is_empty() {
        return Err(FetchError::SourceUnavailable(
            "Listing contained no parseable items".to_string(),
        ));
    }

    // The listing is newest-first, so everything from the first admitted
    // item onward that the checkpoint rejects has been seen before.
    parsed.items.retain(|item| since.admits(&item.source_id));

    // A cap keeps the OLDEST candidates: items are processed and
    // checkpointed oldest-first, so dropping from the old end instead
    // would let the checkpoint jump over items that were never handled.
    if let Some(cap) = limit {
        if parsed.items.len() > cap {
            let excess = parsed.items.len() - cap;
            parsed.items.drain(..excess);
        }
    }

    for item in &mut parsed.items {
        for media_url in &mut item.media_urls {
            *media_url = upgrade_image_url(client, media_url).await;
        }
    }

    tracing::info!(
        "Listing fetched: {} new candidates, {} nodes skipped",
        parsed.items.len(),
        parsed.skipped
    );

    Ok(parsed)
}

/// Upgrades a preview image URL to its full-size variant when one exists
///
/// Sources often embed `.preview.` thumbnails on the listing page while
/// serving the full image at the same path without the marker. A HEAD
/// probe confirms the full-size file exists; on any failure the preview
/// URL is kept.
pub async fn upgrade_image_url(client: &Client, url: &str) -> String {
    if !url.contains(".preview.") {
        return url.to_string();
    }

    let full_url = url.replace(".preview.", ".");

    match client.head(&full_url).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!("Upgraded preview image to {}", full_url);
            full_url
        }
        _ => url.to_string(),
    }
}
