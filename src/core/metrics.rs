// src/core/metrics.rs

//! A plain, read-only snapshot of store-level counters.
//!
//! This is deliberately not a metrics server or a Prometheus exporter -- the
//! surrounding authentication framework already owns its own observability
//! surface and is expected to sample [`StoreMetrics`] into whatever system it
//! uses. See [`crate::core::store::NativeUserStore::metrics`].

use std::time::Duration;

/// A point-in-time snapshot, as of the call to `NativeUserStore::metrics()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    /// The number of distinct usernames the poller currently tracks.
    pub known_users: usize,
    /// The cumulative count of failed realm-cache purges since the last
    /// `reset()` (or since the process started, if never reset).
    pub purge_failures: u64,
    /// Wall-clock duration of the most recently *completed* poll iteration.
    /// `None` before the first iteration has completed.
    pub last_poll_duration: Option<Duration>,
    /// Number of changed usernames reported by the most recently completed
    /// poll iteration.
    pub last_poll_changed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_all_zero() {
        let metrics = StoreMetrics::default();
        assert_eq!(metrics.known_users, 0);
        assert_eq!(metrics.purge_failures, 0);
        assert_eq!(metrics.last_poll_duration, None);
        assert_eq!(metrics.last_poll_changed_count, 0);
    }
}
