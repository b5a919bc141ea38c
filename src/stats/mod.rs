//! Streaming statistics, shared across threads and persisted between runs.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, SharedStats, StatsSnapshot,
    StreamStats,
};
