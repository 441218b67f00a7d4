//! Publisher adapter boundary
//!
//! The pipeline hands fully materialized items to a publisher behind a
//! trait; the ingestion cycle never knows which channel it is feeding.

mod telegram;

pub use telegram::TelegramPublisher;

use crate::storage::ItemRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while publishing an item
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The channel answered but refused the item
    #[error("Publish rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Publisher misconfigured: {0}")]
    Config(String),
}

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// A destination channel for fully materialized items
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one item. Success means the channel accepted it; the
    /// caller records the status and never retries within the cycle.
    async fn publish(&self, item: &ItemRecord) -> PublishResult<()>;

    /// Human-readable channel name for logs
    fn name(&self) -> &'static str;
}

/// Publisher that accepts everything and sends nothing
///
/// Used when no channel is configured: items are still fetched, stored,
/// and checkpointed, and marked published immediately.
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, item: &ItemRecord) -> PublishResult<()> {
        tracing::debug!("Null publisher accepted {}", item.source_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
