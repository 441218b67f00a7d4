//! Cycle orchestration
//!
//! Runs ingestion cycles: load the checkpoint, fetch the listing, then for
//! each new candidate (oldest first) insert, download media, publish, and
//! finalize. The checkpoint only ever passes items that reached a terminal
//! status, so a crash mid-cycle resumes exactly where it stopped.

use crate::config::Config;
use crate::fetch::{build_http_client, fetch_listing};
use crate::health::HealthTracker;
use crate::media::{MediaError, MediaFetcher};
use crate::metrics::{names, Metrics};
use crate::publish::Publisher;
use crate::storage::{NewItem, PublishStatus, SqliteStore, StorageError, Store};
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

/// Summary of one finished cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// New candidates the listing yielded past the checkpoint
    pub discovered: u64,

    /// Items that reached `published` this cycle
    pub published: u64,

    /// Items that reached `failed` this cycle
    pub failed: u64,

    /// Candidates dropped because the store already held them
    pub deduped: u64,

    /// Listing nodes skipped as unparseable
    pub skipped_parse: u64,

    /// Checkpoint value after the cycle
    pub checkpoint: String,
}

/// Drives ingestion cycles over the shared components
pub struct Orchestrator {
    config: Config,
    store: Arc<Mutex<SqliteStore>>,
    client: Client,
    media: MediaFetcher,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<Metrics>,
    health: Arc<HealthTracker>,
    in_flight: AtomicBool,
    shutdown: watch::Receiver<bool>,
    /// Cap on candidates per cycle, used by smoke runs
    test_limit: Option<usize>,
}

impl Orchestrator {
    /// Creates an orchestrator over shared components
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `store` - The shared item store
    /// * `publisher` - Destination channel adapter
    /// * `metrics` - Shared metrics collector
    /// * `health` - Shared health tracker
    /// * `shutdown` - Flips to true when the process is stopping
    /// * `test_limit` - Optional per-cycle candidate cap
    pub fn new(
        config: Config,
        store: Arc<Mutex<SqliteStore>>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<Metrics>,
        health: Arc<HealthTracker>,
        shutdown: watch::Receiver<bool>,
        test_limit: Option<usize>,
    ) -> Result<Self> {
        let client = build_http_client(&config.source)?;
        let media = MediaFetcher::new(client.clone(), &config.media);

        Ok(Self {
            config,
            store,
            client,
            media,
            publisher,
            metrics,
            health,
            in_flight: AtomicBool::new(false),
            shutdown,
            test_limit,
        })
    }

    /// Runs one cycle unless another is already in flight
    ///
    /// # Returns
    ///
    /// * `Ok(Some(outcome))` - The cycle ran
    /// * `Ok(None)` - Skipped: a cycle was already running
    /// * `Err(_)` - The cycle aborted on a fatal error
    pub async fn try_run_cycle(&self) -> Result<Option<CycleOutcome>> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("Cycle already in flight, skipping this trigger");
            self.metrics.count(names::CYCLES_SKIPPED);
            return Ok(None);
        }

        let result = self.run_cycle().await;
        self.in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                self.metrics.count(names::CYCLES_FATAL);
                self.health.record_cycle(true, 0);
                Err(e)
            }
        }
    }

    async fn run_cycle(&self) -> Result<CycleOutcome> {
        let started = Instant::now();

        let checkpoint = self.store.lock().await.load_checkpoint()?;
        tracing::info!(
            "Starting cycle from checkpoint {:?}",
            if checkpoint.is_unset() {
                "<unset>"
            } else {
                checkpoint.last_item_id.as_str()
            }
        );

        // Capped smoke runs scan the full listing; dedup on insert keeps
        // them from re-publishing stored items.
        let scan_from = if self.test_limit.is_some() {
            crate::storage::Checkpoint::unset()
        } else {
            checkpoint.clone()
        };
        let listing =
            fetch_listing(&self.client, &self.config.source, &scan_from, self.test_limit).await?;

        let mut outcome = CycleOutcome {
            discovered: listing.items.len() as u64,
            skipped_parse: listing.skipped as u64,
            ..CycleOutcome::default()
        };
        self.metrics
            .count_by(names::ITEMS_DISCOVERED, outcome.discovered);
        self.metrics
            .count_by(names::ITEMS_PARSE_ERRORS, outcome.skipped_parse);

        // The listing is newest-first; processing oldest-first means the
        // checkpoint never passes an item that has not been resolved.
        for candidate in listing.items.iter().rev() {
            if *self.shutdown.borrow() {
                tracing::info!("Shutdown requested, ending cycle early");
                break;
            }

            let new_item = NewItem {
                source_id: candidate.source_id.clone(),
                title: candidate.title.clone(),
                source_url: candidate.source_url.clone(),
                description: candidate.description.clone(),
                media_urls: candidate.media_urls.clone(),
            };

            match self.store.lock().await.insert_item(&new_item) {
                Ok(_) => {}
                Err(StorageError::Conflict(_)) => {
                    tracing::debug!("Already stored: {}", candidate.source_id);
                    self.metrics.count(names::ITEMS_DEDUPED);
                    outcome.deduped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            self.process_item(&candidate.source_id, &candidate.media_urls, &mut outcome)
                .await?;
        }

        outcome.checkpoint = self.store.lock().await.load_checkpoint()?.last_item_id;

        let elapsed = started.elapsed();
        self.metrics.observe(names::CYCLE_DURATION, elapsed);
        self.metrics.count(names::CYCLES_COMPLETED);
        if let Ok(total) = self.store.lock().await.count_items() {
            self.metrics.gauge("items.total", total as f64);
        }
        self.health.record_cycle(false, outcome.failed);

        tracing::info!(
            "Cycle finished in {:?}: {} discovered, {} published, {} failed, {} deduped",
            elapsed,
            outcome.discovered,
            outcome.published,
            outcome.failed,
            outcome.deduped
        );

        Ok(outcome)
    }

    /// Downloads media, publishes, and finalizes one stored item
    ///
    /// Item-level failures mark the item failed and continue the cycle;
    /// only storage errors propagate.
    async fn process_item(
        &self,
        source_id: &str,
        media_urls: &[String],
        outcome: &mut CycleOutcome,
    ) -> Result<()> {
        match self.media.fetch_all(source_id, media_urls).await {
            Ok(set) => {
                let retries = set.total_attempts.saturating_sub(set.artifacts.len() as u32);
                if retries > 0 {
                    self.metrics.count_by(names::MEDIA_RETRIES, retries as u64);
                }
                let paths: Vec<String> = set
                    .artifacts
                    .iter()
                    .map(|a| a.path.to_string_lossy().into_owned())
                    .collect();
                self.store
                    .lock()
                    .await
                    .set_artifacts(source_id, &paths, set.total_attempts)?;
            }
            Err(e) => {
                tracing::warn!("Media failed for {}: {}", source_id, e);
                self.metrics.count(names::MEDIA_FAILURES);
                if let MediaError::Exhausted { attempts, .. } = &e {
                    self.metrics
                        .count_by(names::MEDIA_RETRIES, attempts.saturating_sub(1) as u64);
                }
                self.finalize(source_id, PublishStatus::Failed, Some(&e.to_string()))
                    .await?;
                outcome.failed += 1;
                return Ok(());
            }
        }

        let record = match self.store.lock().await.get_item(source_id)? {
            Some(record) => record,
            None => return Err(StorageError::NotFound(source_id.to_string()).into()),
        };

        match self.publisher.publish(&record).await {
            Ok(()) => {
                self.finalize(source_id, PublishStatus::Published, None).await?;
                self.metrics.count(names::ITEMS_PUBLISHED);
                outcome.published += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Publisher {} rejected {}: {}",
                    self.publisher.name(),
                    source_id,
                    e
                );
                self.finalize(source_id, PublishStatus::Failed, Some(&e.to_string()))
                    .await?;
                outcome.failed += 1;
            }
        }

        Ok(())
    }

    async fn finalize(
        &self,
        source_id: &str,
        status: PublishStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        if status == PublishStatus::Failed {
            self.metrics.count(names::ITEMS_FAILED);
        }
        let published_at = match status {
            PublishStatus::Published => Some(Utc::now().to_rfc3339()),
            _ => None,
        };
        self.store
            .lock()
            .await
            .finalize_item(source_id, status, reason, published_at.as_deref())?;
        Ok(())
    }

    /// Runs cycles on a fixed interval until shutdown
    ///
    /// A tick that falls while a cycle is still running is skipped rather
    /// than queued. Fatal cycle errors are logged and the schedule keeps
    /// going.
    pub async fn run_scheduled(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        tracing::info!("Scheduling a cycle every {:?}", every);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.try_run_cycle().await {
                        tracing::error!("Cycle aborted: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Re-runs media download and publish for stored unpublished items
    ///
    /// Does not touch the listing or the checkpoint: reprocessed items are
    /// already at or below it.
    pub async fn reprocess(&self, limit: u32) -> Result<CycleOutcome> {
        let items = self.store.lock().await.unpublished_items(limit)?;
        tracing::info!("Reprocessing {} unpublished items", items.len());

        let mut outcome = CycleOutcome {
            discovered: items.len() as u64,
            ..CycleOutcome::default()
        };

        for item in items.iter().rev() {
            if *self.shutdown.borrow() {
                break;
            }
            self.process_item(&item.source_id, &item.media_urls, &mut outcome)
                .await?;
        }

        outcome.checkpoint = self.store.lock().await.load_checkpoint()?.last_item_id;
        Ok(outcome)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("publisher", &self.publisher.name())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

// Cycle behavior is covered end to end in tests/cycle_tests.rs with a mock
// content source and a recording publisher.
