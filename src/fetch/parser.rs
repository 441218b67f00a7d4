//! Listing page parser
//!
//! This module extracts candidate items from the listing HTML using the
//! configured CSS selectors. Malformed item nodes are skipped and counted
//! rather than failing the whole listing.

use crate::config::SelectorConfig;
use crate::fetch::{FetchError, FetchResult};
use scraper::{Html, Selector};
use url::Url;

/// A candidate item extracted from the listing page, not yet persisted
#[derive(Debug, Clone)]
pub struct CandidateItem {
    /// Stable key derived from the item URL path
    pub source_id: String,

    pub title: String,

    /// Absolute URL of the item's own page
    pub source_url: String,

    pub description: String,

    /// Absolute media URLs in listing order
    pub media_urls: Vec<String>,
}

/// Result of parsing a listing page
#[derive(Debug)]
pub struct ParsedListing {
    /// Successfully extracted candidates, in listing order (newest first)
    pub items: Vec<CandidateItem>,

    /// Item nodes skipped because a required field was missing
    pub skipped: u32,
}

/// Derives the stable source id from an item URL
///
/// The id is the URL path, so ids compare the way the source orders its
/// items (e.g. `/photos/29054-title.html`).
pub fn derive_source_id(url: &Url) -> String {
    url.path().to_string()
}

/// Parses a listing page into candidate items
///
/// # Arguments
///
/// * `html` - The listing page HTML
/// * `base_url` - The base URL for resolving relative links
/// * `selectors` - CSS selectors locating the item fields
///
/// # Returns
///
/// * `Ok(ParsedListing)` - Candidates plus a count of skipped nodes
/// * `Err(FetchError::ItemParse)` - A configured selector failed to parse
pub fn parse_listing(
    html: &str,
    base_url: &Url,
    selectors: &SelectorConfig,
) -> FetchResult<ParsedListing> {
    let item_sel = parse_selector("item", &selectors.item)?;
    let title_sel = parse_selector("title", &selectors.title)?;
    let image_sel = parse_selector("image", &selectors.image)?;
    let description_sel = parse_selector("description", &selectors.description)?;

    let document = Html::parse_document(html);

    let mut items = Vec::new();
    let mut skipped = 0u32;

    for node in document.select(&item_sel) {
        // Title link carries both the display title and the item URL;
        // a node without one is not an item.
        let title_el = match node.select(&title_sel).next() {
            Some(el) => el,
            None => {
                skipped += 1;
                continue;
            }
        };

        let title = title_el.text().collect::<String>().trim().to_string();
        let href = match title_el.value().attr("href") {
            Some(h) => h,
            None => {
                skipped += 1;
                continue;
            }
        };

        let source_url = match base_url.join(href) {
            Ok(url) => url,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        if title.is_empty() {
            skipped += 1;
            continue;
        }

        let media_urls = node
            .select(&image_sel)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| base_url.join(src).ok())
            .map(|url| url.to_string())
            .collect::<Vec<_>>();

        let description = node
            .select(&description_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        items.push(CandidateItem {
            source_id: derive_source_id(&source_url),
            title,
            source_url: source_url.to_string(),
            description,
            media_urls,
        });
    }

    Ok(ParsedListing { items, skipped })
}

fn parse_selector(name: &str, value: &str) -> FetchResult<Selector> {
    Selector::parse(value)
        .map_err(|_| FetchError::ItemParse(format!("Invalid selector {}: {}", name, value)))
}
