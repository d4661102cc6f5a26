//! Per-bucket health tracking
//!
//! Each fetch outcome updates the bucket's record. Consecutive failures
//! degrade a bucket and eventually mark it unhealthy; one success restores
//! it. Records are kept in memory for the lifetime of the engine.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Consecutive failures before a bucket is reported degraded
pub const DEGRADED_THRESHOLD: u32 = 2;

/// Consecutive failures before a bucket is reported unhealthy
pub const UNHEALTHY_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "unknown"),
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health record of one bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketHealth {
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    /// Duration of the last successful network fetch
    pub response_time_ms: Option<u64>,
    /// Failures since the last success
    pub error_count: u32,
    pub consecutive_fails: u32,
    pub last_error: Option<String>,
}

impl BucketHealth {
    fn success(&mut self, elapsed: Duration) {
        let now = Utc::now();
        self.status = HealthStatus::Healthy;
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.response_time_ms = Some(elapsed.as_millis().min(u128::from(u64::MAX)) as u64);
        self.error_count = 0;
        self.consecutive_fails = 0;
        self.last_error = None;
    }

    fn failure(&mut self, error: &str) {
        self.last_check = Some(Utc::now());
        self.error_count = self.error_count.saturating_add(1);
        self.consecutive_fails = self.consecutive_fails.saturating_add(1);
        self.last_error = Some(error.to_string());

        if self.consecutive_fails >= UNHEALTHY_THRESHOLD {
            self.status = HealthStatus::Unhealthy;
        } else if self.consecutive_fails >= DEGRADED_THRESHOLD {
            self.status = HealthStatus::Degraded;
        }
    }
}

/// Thread-safe map of bucket name to health record
#[derive(Debug, Default)]
pub struct HealthTracker {
    records: Mutex<HashMap<String, BucketHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful network fetch
    pub fn record_success(&self, bucket: &str, elapsed: Duration) {
        self.records
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .success(elapsed);
    }

    /// Record a failed fetch (after retries are exhausted)
    pub fn record_failure(&self, bucket: &str, error: &str) {
        let mut records = self.records.lock();
        let record = records.entry(bucket.to_string()).or_default();
        record.failure(error);
        if record.status != HealthStatus::Healthy && record.status != HealthStatus::Unknown {
            tracing::warn!(
                bucket,
                status = %record.status,
                consecutive_fails = record.consecutive_fails,
                "bucket health changed"
            );
        }
    }

    /// A fresh cache hit only proves the bucket was looked at
    pub fn record_cache_hit(&self, bucket: &str) {
        self.records
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .last_check = Some(Utc::now());
    }

    pub fn get(&self, bucket: &str) -> Option<BucketHealth> {
        self.records.lock().get(bucket).cloned()
    }

    /// All records, ordered by bucket name
    pub fn snapshot(&self) -> Vec<(String, BucketHealth)> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .iter()
            .map(|(name, health)| (name.clone(), health.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    pub fn remove(&self, bucket: &str) {
        self.records.lock().remove(bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_checked() {
        let tracker = HealthTracker::new();
        assert!(tracker.get("main").is_none());
        assert_eq!(BucketHealth::default().status, HealthStatus::Unknown);
    }

    #[test]
    fn test_failure_thresholds() {
        let tracker = HealthTracker::new();

        tracker.record_failure("main", "boom");
        let health = tracker.get("main").unwrap();
        assert_eq!(health.status, HealthStatus::Unknown);
        assert_eq!(health.consecutive_fails, 1);

        tracker.record_failure("main", "boom");
        assert_eq!(tracker.get("main").unwrap().status, HealthStatus::Degraded);

        for _ in 0..3 {
            tracker.record_failure("main", "boom");
        }
        let health = tracker.get("main").unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.consecutive_fails, 5);
        assert_eq!(health.error_count, 5);
        assert_eq!(health.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_resets_counters() {
        let tracker = HealthTracker::new();
        for _ in 0..3 {
            tracker.record_failure("main", "boom");
        }
        tracker.record_success("main", Duration::from_millis(120));

        let health = tracker.get("main").unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.consecutive_fails, 0);
        assert_eq!(health.error_count, 0);
        assert_eq!(health.response_time_ms, Some(120));
        assert!(health.last_success.is_some());
        assert!(health.last_error.is_none());
    }

    #[test]
    fn test_single_failure_keeps_healthy() {
        let tracker = HealthTracker::new();
        tracker.record_success("main", Duration::from_millis(5));
        tracker.record_failure("main", "blip");
        assert_eq!(tracker.get("main").unwrap().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_cache_hit_touches_last_check_only() {
        let tracker = HealthTracker::new();
        tracker.record_cache_hit("main");
        let health = tracker.get("main").unwrap();
        assert_eq!(health.status, HealthStatus::Unknown);
        assert!(health.last_check.is_some());
        assert!(health.last_success.is_none());
    }

    #[test]
    fn test_snapshot_sorted() {
        let tracker = HealthTracker::new();
        tracker.record_cache_hit("zeta");
        tracker.record_cache_hit("alpha");
        let names: Vec<_> = tracker.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        tracker.remove("alpha");
        assert!(tracker.get("alpha").is_none());
    }
}
