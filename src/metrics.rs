//! In-process metrics collection
//!
//! Counters, timers, and gauges accumulated over the process lifetime and
//! exposed as a snapshot by the HTTP server. All methods take `&self`;
//! internal state sits behind a mutex so the collector can be shared
//! across tasks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Metric names used by the pipeline
pub mod names {
    pub const ITEMS_DISCOVERED: &str = "items.discovered";
    pub const ITEMS_PUBLISHED: &str = "items.published";
    pub const ITEMS_FAILED: &str = "items.failed";
    pub const ITEMS_DEDUPED: &str = "items.deduped";
    pub const ITEMS_PARSE_ERRORS: &str = "items.parse_errors";
    pub const MEDIA_RETRIES: &str = "media.retries";
    pub const MEDIA_FAILURES: &str = "media.failures";
    pub const CYCLES_COMPLETED: &str = "cycles.completed";
    pub const CYCLES_SKIPPED: &str = "cycles.skipped";
    pub const CYCLES_FATAL: &str = "cycles.fatal";
    pub const CYCLE_DURATION: &str = "cycle.duration";
}

#[derive(Debug, Default)]
struct Inner {
    counters: BTreeMap<String, u64>,
    timers: BTreeMap<String, TimerState>,
    gauges: BTreeMap<String, f64>,
}

#[derive(Debug, Default, Clone)]
struct TimerState {
    count: u64,
    total_secs: f64,
    min_secs: f64,
    max_secs: f64,
}

/// Shared metrics collector
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Inner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments a counter by one
    pub fn count(&self, name: &str) {
        self.count_by(name, 1);
    }

    /// Increments a counter by `n`
    pub fn count_by(&self, name: &str, n: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.counters.entry(name.to_string()).or_insert(0) += n;
        }
    }

    /// Records one observation of a duration timer
    pub fn observe(&self, name: &str, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if let Ok(mut inner) = self.inner.lock() {
            let timer = inner.timers.entry(name.to_string()).or_default();
            if timer.count == 0 {
                timer.min_secs = secs;
                timer.max_secs = secs;
            } else {
                timer.min_secs = timer.min_secs.min(secs);
                timer.max_secs = timer.max_secs.max(secs);
            }
            timer.count += 1;
            timer.total_secs += secs;
        }
    }

    /// Sets a gauge to an absolute value
    pub fn gauge(&self, name: &str, value: f64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.gauges.insert(name.to_string(), value);
        }
    }

    /// Takes a point-in-time snapshot for the metrics endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return MetricsSnapshot::default(),
        };

        MetricsSnapshot {
            counters: inner.counters.clone(),
            timers: inner
                .timers
                .iter()
                .map(|(name, t)| {
                    (
                        name.clone(),
                        TimerSummary {
                            count: t.count,
                            avg_secs: if t.count > 0 {
                                t.total_secs / t.count as f64
                            } else {
                                0.0
                            },
                            min_secs: t.min_secs,
                            max_secs: t.max_secs,
                        },
                    )
                })
                .collect(),
            gauges: inner.gauges.clone(),
        }
    }
}

/// Point-in-time view of all metrics
#[derive(Debug, Default, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerSummary>,
    pub gauges: BTreeMap<String, f64>,
}

/// Aggregate view of one timer
#[derive(Debug, Clone, Serialize)]
pub struct TimerSummary {
    pub count: u64,
    pub avg_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}
