//! Streaming statistics.
//!
//! Counts what the engine sent and what it dropped, so a user can see why a
//! receiver got fewer records than expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counters shared between the session, its delivery worker and the CLI.
#[derive(Debug)]
pub struct StreamStats {
    /// Sensor records sent
    samples_sent: AtomicU64,
    /// Location records sent
    fixes_sent: AtomicU64,
    /// Payload bytes sent
    bytes_sent: AtomicU64,
    /// Samples that failed to serialize
    serialization_drops: AtomicU64,
    /// Samples from sources no longer in the active set
    inactive_drops: AtomicU64,
    /// Samples dropped because the delivery queue was full
    queue_overflows: AtomicU64,
    /// Sessions started
    sessions_started: AtomicU64,
    /// Sessions ended by a transport failure
    transport_failures: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl StreamStats {
    /// Create new counters, all zero.
    pub fn new() -> Self {
        Self {
            samples_sent: AtomicU64::new(0),
            fixes_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            serialization_drops: AtomicU64::new(0),
            inactive_drops: AtomicU64::new(0),
            queue_overflows: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Stats that continue from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            debug!(error = %e, "could not load previous stats");
        }

        stats
    }

    /// Record a sensor record sent.
    pub fn record_sample_sent(&self, bytes: usize) {
        self.samples_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a location record sent.
    pub fn record_fix_sent(&self, bytes: usize) {
        self.fixes_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a sample dropped because it failed to serialize.
    pub fn record_serialization_drop(&self) {
        self.serialization_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample from a source no longer active.
    pub fn record_inactive_drop(&self) {
        self.inactive_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample dropped on a full delivery queue.
    pub fn record_queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session start.
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session ended by a transport failure.
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
            fixes_sent: self.fixes_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            serialization_drops: self.serialization_drops.load(Ordering::Relaxed),
            inactive_drops: self.inactive_drops.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Streaming Statistics:\n\
             - Sensor records sent: {}\n\
             - Location records sent: {}\n\
             - Bytes sent: {}\n\
             - Dropped (serialization): {}\n\
             - Dropped (inactive source): {}\n\
             - Dropped (queue full): {}\n\
             - Sessions started: {}\n\
             - Transport failures: {}\n\
             - Uptime: {} seconds",
            s.samples_sent,
            s.fixes_sent,
            s.bytes_sent,
            s.serialization_drops,
            s.inactive_drops,
            s.queue_overflows,
            s.sessions_started,
            s.transport_failures,
            s.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let s = self.snapshot();
            let persisted = PersistedStats {
                samples_sent: s.samples_sent,
                fixes_sent: s.fixes_sent,
                bytes_sent: s.bytes_sent,
                serialization_drops: s.serialization_drops,
                inactive_drops: s.inactive_drops,
                queue_overflows: s.queue_overflows,
                sessions_started: s.sessions_started,
                transport_failures: s.transport_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let p: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_sent.store(p.samples_sent, Ordering::Relaxed);
                self.fixes_sent.store(p.fixes_sent, Ordering::Relaxed);
                self.bytes_sent.store(p.bytes_sent, Ordering::Relaxed);
                self.serialization_drops
                    .store(p.serialization_drops, Ordering::Relaxed);
                self.inactive_drops.store(p.inactive_drops, Ordering::Relaxed);
                self.queue_overflows.store(p.queue_overflows, Ordering::Relaxed);
                self.sessions_started
                    .store(p.sessions_started, Ordering::Relaxed);
                self.transport_failures
                    .store(p.transport_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_sent: u64,
    pub fixes_sent: u64,
    pub bytes_sent: u64,
    pub serialization_drops: u64,
    pub inactive_drops: u64,
    pub queue_overflows: u64,
    pub sessions_started: u64,
    pub transport_failures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_sent: u64,
    fixes_sent: u64,
    bytes_sent: u64,
    serialization_drops: u64,
    inactive_drops: u64,
    queue_overflows: u64,
    sessions_started: u64,
    transport_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<StreamStats>;

/// Create shared stats.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(StreamStats::new())
}

/// Create shared stats with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(StreamStats::with_persistence(path))
}
