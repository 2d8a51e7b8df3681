//! Core data models for the emitter

use crate::path::PathMap;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// A pod as seen by the pod source
///
/// Listing may return thin records; the orchestrator's read-through
/// cache fills in annotations, labels and containers on first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    // BTreeMap keeps annotation/label iteration stable between passes
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<String>,
}

/// One synthetic measurement: the path it was pushed under plus the
/// drawn values
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathMap,
    /// Floored draw, integral-valued
    pub cpu_millicores: f64,
    /// Floored draw, clamped at zero
    pub mem_bytes: u64,
}

/// Outcome of one emit pass
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub pods_total: usize,
    pub pods_matched: usize,
    /// Samples the sink accepted
    pub samples_pushed: usize,
    /// Samples the sink rejected or that never reached it
    pub push_failures: usize,
    /// Lifetime query-endpoint hits at the time the pass finished
    pub api_request_count: u64,
    /// Keys the validator rejected anywhere in this pass
    pub skipped_keys: BTreeSet<String>,
}

impl PassSummary {
    /// Human-readable skipped-key list for the trigger response
    pub fn skipped_keys_text(&self) -> String {
        if self.skipped_keys.is_empty() {
            return "(none)".to_string();
        }
        self.skipped_keys
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}
