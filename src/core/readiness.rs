// src/core/readiness.rs

//! The cluster-readiness probe: decides whether the store may leave its
//! initial state, and tracks the `indexReady` flag that gates the poller.

use std::sync::atomic::{AtomicBool, Ordering};

/// The state of the security index's primary shards, as observed in a
/// cluster-state snapshot. `None` means the index does not exist yet.
#[derive(Debug, Clone, Copy)]
pub struct IndexShardsState {
    pub all_primary_shards_active: bool,
}

/// A point-in-time view of the facts `can_start` and `on_cluster_changed`
/// need. Supplied by the surrounding authentication framework whenever the
/// cluster state changes.
#[derive(Debug, Clone, Copy)]
pub struct ClusterSnapshot {
    /// Whether the cluster has finished recovering its metadata from disk.
    pub recovered_from_disk: bool,
    /// Whether the expected security index template is installed.
    pub index_template_exists: bool,
    /// `None` if the security index does not exist yet.
    pub security_index: Option<IndexShardsState>,
}

/// Why `can_start` returned `false`, broken down by clause. The public
/// contract only promises a `bool`; this report is an additive internal
/// helper so the lifecycle controller can log a specific reason instead of
/// a bare "not ready" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    ClusterNotRecovered,
    IndexTemplateMissing,
    PrimaryShardsNotActive,
}

/// The result of a readiness check: either ready, or not-ready with a reason.
pub type ReadinessReport = Result<(), NotReadyReason>;

/// Evaluates whether the store may transition out of `Initialized`.
///
/// Returns `Ok(())` only if the cluster has recovered from disk, the
/// expected index template exists, and either the security index does not
/// exist yet or it exists with all primary shards active.
pub fn evaluate_readiness(snapshot: &ClusterSnapshot) -> ReadinessReport {
    if !snapshot.recovered_from_disk {
        return Err(NotReadyReason::ClusterNotRecovered);
    }
    if !snapshot.index_template_exists {
        return Err(NotReadyReason::IndexTemplateMissing);
    }
    match snapshot.security_index {
        None => Ok(()),
        Some(shards) if shards.all_primary_shards_active => Ok(()),
        Some(_) => Err(NotReadyReason::PrimaryShardsNotActive),
    }
}

/// Whether the security index itself is ready for the poller to scan:
/// it must exist, with all primary shards active. This is a narrower check
/// than `evaluate_readiness` -- a store that hasn't seen the index yet can
/// still be `Started`, it just gates the poller until the index shows up.
fn index_is_ready(snapshot: &ClusterSnapshot) -> bool {
    matches!(
        snapshot.security_index,
        Some(IndexShardsState {
            all_primary_shards_active: true
        })
    )
}

/// A volatile flag, written by the cluster-change callback and read by the
/// poller, with no locking required on either side.
#[derive(Debug, Default)]
pub struct IndexReadyFlag(AtomicBool);

impl IndexReadyFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Recomputes the flag from a fresh cluster-state snapshot.
    pub fn update(&self, snapshot: &ClusterSnapshot) {
        self.0.store(index_is_ready(snapshot), Ordering::SeqCst);
    }
}
