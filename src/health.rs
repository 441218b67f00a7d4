//! Health derivation
//!
//! Tracks cycle outcomes and derives an overall health status from the
//! most recent cycle, cycle staleness, and store reachability.

use crate::config::HealthConfig;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Recent cycle succeeded and the store is reachable
    Healthy,

    /// Service is running but the last cycle failed, had too many item
    /// failures, or no cycle has finished within the staleness window
    Degraded,

    /// The store is unreachable
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one finished cycle, as health sees it
#[derive(Debug, Clone)]
struct CycleReport {
    finished_at: DateTime<Utc>,
    fatal: bool,
    item_failures: u64,
}

/// Records cycle outcomes and answers health queries
#[derive(Debug, Default)]
pub struct HealthTracker {
    last_cycle: Mutex<Option<CycleReport>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished cycle
    ///
    /// # Arguments
    ///
    /// * `fatal` - The cycle aborted on a source or store failure
    /// * `item_failures` - Items that ended the cycle in `failed` status
    pub fn record_cycle(&self, fatal: bool, item_failures: u64) {
        if let Ok(mut last) = self.last_cycle.lock() {
            *last = Some(CycleReport {
                finished_at: Utc::now(),
                fatal,
                item_failures,
            });
        }
    }

    /// Derives the current health status
    ///
    /// Store unreachability dominates everything else. Before the first
    /// cycle finishes a reachable store reports healthy, so fresh deploys
    /// pass their checks.
    pub fn evaluate(&self, store_ok: bool, config: &HealthConfig) -> HealthStatus {
        if !store_ok {
            return HealthStatus::Unhealthy;
        }

        let last = match self.last_cycle.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return HealthStatus::Degraded,
        };

        match last {
            None => HealthStatus::Healthy,
            Some(report) => {
                if report.fatal {
                    return HealthStatus::Degraded;
                }
                if report.item_failures > config.failure_threshold {
                    return HealthStatus::Degraded;
                }
                let stale_after = Duration::hours(config.staleness_hours as i64);
                if Utc::now() - report.finished_at > stale_after {
                    return HealthStatus::Degraded;
                }
                HealthStatus::Healthy
            }
        }
    }
}
