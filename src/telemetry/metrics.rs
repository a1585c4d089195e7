//! Request metrics: facade emission plus a value store for snapshots.
//!
//! The `metrics` facade handles exporter integration; the aggregator
//! keeps the values the serving API reports through `get_metrics`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::models::ModelKey;

/// Point-in-time copy of the request counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
    /// Resolved requests per model, keyed as `name:version`.
    pub requests_per_model: HashMap<String, u64>,
}

/// Process-wide request counters.
///
/// Every field is an individual atomic, so reads are eventually
/// consistent with concurrent writers but never observe a torn value.
/// The average keeps a running sum and count rather than per-request
/// samples.
pub struct MetricsAggregator {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    latency_sum_us: AtomicU64,
    per_model: DashMap<ModelKey, u64>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            per_model: DashMap::new(),
        }
    }

    /// Record one resolved request. Called exactly once per resolution.
    pub fn record(&self, key: &ModelKey, latency_ms: f64, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let micros = (latency_ms * 1000.0).max(0.0) as u64;
        self.latency_sum_us.fetch_add(micros, Ordering::Relaxed);
        self.per_model
            .entry(key.clone())
            .and_modify(|count| *count += 1)
            .or_insert(1);

        let outcome = if success { "success" } else { "failure" };
        metrics::counter!(
            "serving_requests_total",
            "model" => key.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("serving_request_latency_ms", "model" => key.to_string())
            .record(latency_ms);
    }

    /// Copy-on-read snapshot. Non-blocking for writers.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let sum_us = self.latency_sum_us.load(Ordering::Relaxed);
        let average_latency_ms = if total == 0 {
            0.0
        } else {
            sum_us as f64 / 1000.0 / total as f64
        };

        MetricsSnapshot {
            total_requests: total,
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            average_latency_ms,
            requests_per_model: self
                .per_model
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "serving_requests_total",
        "Resolved inference requests by model and outcome"
    );
    metrics::describe_histogram!(
        "serving_request_latency_ms",
        metrics::Unit::Milliseconds,
        "Per-request latency from submission to resolution"
    );
}
