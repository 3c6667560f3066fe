//! Engine tuning knobs.

use std::time::Duration;

use docsync_types::SourceId;

/// Configuration for [`DocSyncClient`](crate::DocSyncClient).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sources queried by fetches and fan-outs, in priority order.
    pub sources: Vec<SourceId>,
    /// Hard deadline for a racing fetch.
    pub hard_timeout: Duration,
    /// How long to keep listening after the first response arrives.
    pub settle_window: Duration,
    /// Per-source deadline during exhaustive aggregation.
    pub per_source_timeout: Duration,
    /// Maximum sources queried concurrently during a fan-out.
    pub batch_size: usize,
    /// Pause between fan-out batches.
    pub batch_stagger: Duration,
    /// Cache entry time-to-live.
    pub cache_ttl: Duration,
    /// Maximum cached documents.
    pub cache_capacity: usize,
    /// Maximum attestation records kept in memory.
    pub attestation_ceiling: usize,
    /// Quiet period before a store snapshot is persisted.
    pub persist_debounce: Duration,
}

impl SyncConfig {
    /// Create a configuration with production defaults.
    pub fn new(sources: Vec<SourceId>) -> Self {
        Self {
            sources,
            hard_timeout: Duration::from_secs(5),
            settle_window: Duration::from_millis(500),
            per_source_timeout: Duration::from_secs(5),
            batch_size: 20,
            batch_stagger: Duration::from_millis(300),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 512,
            attestation_ceiling: 10_000,
            persist_debounce: Duration::from_secs(2),
        }
    }

    /// Set the hard fetch deadline.
    pub fn with_hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = timeout;
        self
    }

    /// Set the settle window.
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// Set the per-source aggregation deadline.
    pub fn with_per_source_timeout(mut self, timeout: Duration) -> Self {
        self.per_source_timeout = timeout;
        self
    }

    /// Set the fan-out batch size and stagger.
    pub fn with_batching(mut self, batch_size: usize, stagger: Duration) -> Self {
        self.batch_size = batch_size;
        self.batch_stagger = stagger;
        self
    }

    /// Set the cache time-to-live and capacity.
    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache_capacity = capacity;
        self
    }

    /// Set the attestation record ceiling.
    pub fn with_attestation_ceiling(mut self, ceiling: usize) -> Self {
        self.attestation_ceiling = ceiling;
        self
    }

    /// Set the persistence debounce window.
    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }
}
