//! Performance Monitor
//!
//! Process-wide counters, updated once per completed request under a single
//! lock so concurrent cascades never race. Cancelled requests only bump the
//! cancelled counter; their attempts are not counted. Cache hits are counted
//! on their own and never as requests.

use crate::capabilities::Capabilities;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::info;
use undertone_common::{BackendId, CascadeAttempt, ErrorKind};

/// What one completed request contributes to the metrics
#[derive(Debug, Clone)]
pub struct RequestOutcome<'a> {
    pub attempts: &'a [CascadeAttempt],
    /// Final result did not come from the first planned candidate
    pub used_fallback: bool,
    /// Final result is the ultimate fallback
    pub degraded: bool,
    /// A remote enhancement was merged into the result
    pub merged: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: BTreeMap<ErrorKind, u64>,
    pub total_duration_ms: u64,
}

impl BackendStats {
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    fallback_usage_count: u64,
    ultimate_fallback_count: u64,
    merged_count: u64,
    cancelled_requests: u64,
    cache_hits: u64,
    total_latency_ms: u64,
    backends: BTreeMap<BackendId, BackendStats>,
    since: DateTime<Utc>,
}

impl Counters {
    fn new() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            fallback_usage_count: 0,
            ultimate_fallback_count: 0,
            merged_count: 0,
            cancelled_requests: 0,
            cache_hits: 0,
            total_latency_ms: 0,
            backends: BTreeMap::new(),
            since: Utc::now(),
        }
    }
}

/// Snapshot of the metrics, with the capability snapshot it was taken under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub total_requests: u64,
    /// 0-100; 100 when nothing has run yet
    pub success_rate: f64,
    pub fallback_usage_count: u64,
    pub ultimate_fallback_count: u64,
    pub merged_count: u64,
    pub cancelled_requests: u64,
    /// Requests answered from the result cache without running a cascade
    #[serde(default)]
    pub cache_hits: u64,
    pub avg_latency_ms: f64,
    pub backends: BTreeMap<BackendId, BackendStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    counters: Mutex<Counters>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::new()),
        }
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
        match self.counters.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Fold one completed request into the counters
    pub fn record(&self, outcome: &RequestOutcome<'_>) {
        self.with_counters(|c| {
            c.total_requests += 1;
            if !outcome.degraded {
                c.successful_requests += 1;
            }
            if outcome.used_fallback {
                c.fallback_usage_count += 1;
            }
            if outcome.degraded {
                c.ultimate_fallback_count += 1;
            }
            if outcome.merged {
                c.merged_count += 1;
            }
            c.total_latency_ms += outcome.latency_ms;

            for attempt in outcome.attempts {
                let stats = c.backends.entry(attempt.backend_id).or_default();
                stats.attempts += 1;
                stats.total_duration_ms += attempt.duration_ms;
                match attempt.error_kind {
                    None => stats.successes += 1,
                    Some(kind) => *stats.failures.entry(kind).or_insert(0) += 1,
                }
            }
        });
    }

    pub fn record_cancelled(&self) {
        self.with_counters(|c| c.cancelled_requests += 1);
    }

    pub fn record_cache_hit(&self) {
        self.with_counters(|c| c.cache_hits += 1);
    }

    pub fn report(&self, capabilities: Option<Capabilities>) -> PerformanceReport {
        self.with_counters(|c| PerformanceReport {
            total_requests: c.total_requests,
            success_rate: if c.total_requests == 0 {
                100.0
            } else {
                c.successful_requests as f64 * 100.0 / c.total_requests as f64
            },
            fallback_usage_count: c.fallback_usage_count,
            ultimate_fallback_count: c.ultimate_fallback_count,
            merged_count: c.merged_count,
            cancelled_requests: c.cancelled_requests,
            cache_hits: c.cache_hits,
            avg_latency_ms: if c.total_requests == 0 {
                0.0
            } else {
                c.total_latency_ms as f64 / c.total_requests as f64
            },
            backends: c.backends.clone(),
            capabilities,
            since: c.since,
            generated_at: Utc::now(),
        })
    }

    /// Operator action: zero every counter
    pub fn reset(&self) {
        self.with_counters(|c| *c = Counters::new());
        info!("Performance counters reset");
    }
}
