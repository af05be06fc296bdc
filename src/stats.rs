//! Session counters for the filter pipeline.
//!
//! Tracks how much sensor data moved through the pipeline and how much of
//! it was gated or lost, without retaining any of the sensor values
//! themselves. Counters are atomics so producer threads and the filters
//! can share one instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline statistics for the current session.
#[derive(Debug)]
pub struct PipelineStats {
    /// Raw readings received from sensors
    readings_received: AtomicU64,
    /// Filtered events forwarded downstream
    events_forwarded: AtomicU64,
    /// Readings silently absorbed by a rate gate or an unfilled window
    readings_gated: AtomicU64,
    /// Batch payloads received
    batches_received: AtomicU64,
    /// Payloads dropped because they did not decode
    decode_errors: AtomicU64,
    /// Failed calls to the external detection service
    detection_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    /// Create new pipeline stats.
    pub fn new() -> Self {
        Self {
            readings_received: AtomicU64::new(0),
            events_forwarded: AtomicU64::new(0),
            readings_gated: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            detection_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create pipeline stats with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = stats.load() {
            eprintln!("Note: Could not load previous pipeline stats: {e}");
        }

        stats
    }

    /// Record received readings.
    pub fn record_readings(&self, count: u64) {
        self.readings_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Record forwarded filter events.
    pub fn record_events_forwarded(&self, count: u64) {
        self.events_forwarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Record readings absorbed without an emission.
    pub fn record_readings_gated(&self, count: u64) {
        self.readings_gated.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a received batch payload.
    pub fn record_batch(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an undecodable payload.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed detection service call.
    pub fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            readings_gated: self.readings_gated.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Readings received: {}\n\
             - Events forwarded: {}\n\
             - Readings gated: {}\n\
             - Batches received: {}\n\
             - Decode errors: {}\n\
             - Detection failures: {}\n\
             - Session duration: {} seconds",
            stats.readings_received,
            stats.events_forwarded,
            stats.readings_gated,
            stats.batches_received,
            stats.decode_errors,
            stats.detection_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                readings_received: stats.readings_received,
                events_forwarded: stats.events_forwarded,
                readings_gated: stats.readings_gated,
                batches_received: stats.batches_received,
                decode_errors: stats.decode_errors,
                detection_failures: stats.detection_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.readings_received
                    .store(persisted.readings_received, Ordering::Relaxed);
                self.events_forwarded
                    .store(persisted.events_forwarded, Ordering::Relaxed);
                self.readings_gated
                    .store(persisted.readings_gated, Ordering::Relaxed);
                self.batches_received
                    .store(persisted.batches_received, Ordering::Relaxed);
                self.decode_errors
                    .store(persisted.decode_errors, Ordering::Relaxed);
                self.detection_failures
                    .store(persisted.detection_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.readings_received.store(0, Ordering::Relaxed);
        self.events_forwarded.store(0, Ordering::Relaxed);
        self.readings_gated.store(0, Ordering::Relaxed);
        self.batches_received.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.detection_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatsSnapshot {
    pub readings_received: u64,
    pub events_forwarded: u64,
    pub readings_gated: u64,
    pub batches_received: u64,
    pub decode_errors: u64,
    pub detection_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    readings_received: u64,
    events_forwarded: u64,
    readings_gated: u64,
    batches_received: u64,
    decode_errors: u64,
    detection_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared pipeline stats.
pub type SharedPipelineStats = Arc<PipelineStats>;

/// Create new shared pipeline stats.
pub fn create_shared_stats() -> SharedPipelineStats {
    Arc::new(PipelineStats::new())
}

/// Create new shared pipeline stats with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPipelineStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counting() {
        let stats = PipelineStats::new();

        stats.record_readings(2);
        stats.record_events_forwarded(1);
        stats.record_readings_gated(1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.readings_received, 2);
        assert_eq!(snapshot.events_forwarded, 1);
        assert_eq!(snapshot.readings_gated, 1);
    }

    #[test]
    fn test_stats_reset() {
        let stats = PipelineStats::new();

        stats.record_readings(100);
        stats.record_decode_error();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.readings_received, 0);
        assert_eq!(snapshot.decode_errors, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = PipelineStats::new();
        let summary = stats.summary();

        assert!(summary.contains("Readings received"));
        assert!(summary.contains("Events forwarded"));
        assert!(summary.contains("Detection failures"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = std::env::temp_dir().join(format!("pipeline-stats-{}", uuid::Uuid::new_v4()));
        let path = dir.join("stats.json");

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_readings(7);
        stats.record_events_forwarded(1);
        stats.save().unwrap();

        let reloaded = PipelineStats::with_persistence(path);
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.readings_received, 7);
        assert_eq!(snapshot.events_forwarded, 1);

        let _ = std::fs::remove_dir_all(dir);
    }
}
