// src/core/poller.rs

//! The change-detection poller: scans the full user set on a fixed delay,
//! diffs it against the version map, and notifies listeners of the delta.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, trace, warn};

use crate::core::backing_store::{BackingStoreClient, BackingStoreError, DocumentHit};
use crate::core::error::NativeUserStoreError;
use crate::core::listener::ListenerRegistry;
use crate::core::readiness::IndexReadyFlag;
use crate::core::state::{LifecycleState, StateCell};
use crate::core::version_map::VersionMap;

/// The result of a single poll iteration, used both by the scheduled loop
/// and by the one synchronous poll `start()` performs before scheduling.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub changed_users: Vec<String>,
    pub scanned: usize,
}

/// The outcome of a scoped scroll scan: either the full hit set, or an
/// explicit abort signal distinct from "the index legitimately has no
/// documents" -- the two must never be conflated, since an abort must leave
/// the version map untouched while a genuinely empty index must not.
enum ScrollOutcome {
    Complete(Vec<DocumentHit>),
    Aborted,
}

/// Scans the backing index with a scoped scroll cursor, aborting early if
/// `state` turns `Stopping`/`Stopped`. The scroll is always cleared in its
/// cleanup path, whether the scan completed or was aborted.
async fn scroll_all_users(
    client: &dyn BackingStoreClient,
    index_name: &str,
    page_size: usize,
    keep_alive: Duration,
    state: &StateCell,
) -> Result<ScrollOutcome, NativeUserStoreError> {
    let keep_alive_secs = keep_alive.as_secs();
    let mut hits = Vec::new();

    let first_page = match client.search(index_name, page_size, keep_alive_secs).await {
        Ok(page) => page,
        Err(BackingStoreError::IndexNotFound) => {
            trace!(index_name, "security index missing during scan");
            return Ok(ScrollOutcome::Complete(Vec::new()));
        }
        Err(BackingStoreError::Other(e)) => return Err(e.into()),
    };

    hits.extend(first_page.hits);
    let mut scroll_id = first_page.scroll_id;
    let mut aborted = false;

    let result = async {
        while let Some(id) = scroll_id.clone() {
            // Checkpoint: abort mid-scroll if a concurrent stop() has begun.
            if state.is_stopping_or_stopped() {
                aborted = true;
                return Ok(());
            }
            let page = client
                .search_scroll(&id, keep_alive_secs)
                .await
                .map_err(|e| match e {
                    BackingStoreError::IndexNotFound => anyhow::anyhow!("index not found mid-scroll"),
                    BackingStoreError::Other(e) => e,
                })?;
            hits.extend(page.hits);
            scroll_id = page.scroll_id;
        }
        Ok(())
    }
    .await;

    if let Some(id) = scroll_id {
        if let Err(e) = client.clear_scroll(&[id]).await {
            warn!(error = %e, "best-effort clear-scroll failed");
        }
    }

    result?;

    Ok(if aborted {
        ScrollOutcome::Aborted
    } else {
        ScrollOutcome::Complete(hits)
    })
}

/// Owns the version map and drives one poll iteration at a time. The
/// backing-client reference is passed in per-iteration rather than stored,
/// so a concurrent `reset()` cannot null it out mid-iteration (the
/// lifecycle controller captures it into a local before calling `poll_once`).
pub struct Poller {
    version_map: Mutex<VersionMap>,
    has_completed_a_poll: AtomicBool,
    last_poll_duration_ms: AtomicU64,
    last_poll_changed_count: AtomicUsize,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            version_map: Mutex::new(VersionMap::new()),
            has_completed_a_poll: AtomicBool::new(false),
            last_poll_duration_ms: AtomicU64::new(0),
            last_poll_changed_count: AtomicUsize::new(0),
        }
    }

    pub async fn known_user_count(&self) -> usize {
        self.version_map.lock().await.len()
    }

    /// The duration and changed-user count of the most recently *completed*
    /// iteration (skipped and aborted iterations leave this untouched).
    /// Returns `(None, 0)` before any iteration has completed.
    pub fn last_poll_stats(&self) -> (Option<Duration>, usize) {
        if !self.has_completed_a_poll.load(Ordering::Relaxed) {
            return (None, 0);
        }
        (
            Some(Duration::from_millis(self.last_poll_duration_ms.load(Ordering::Relaxed))),
            self.last_poll_changed_count.load(Ordering::Relaxed),
        )
    }

    /// Test-only: clears the version map, as part of lifecycle `reset()`.
    pub async fn clear(&self) {
        self.version_map.lock().await.clear();
    }

    /// Runs exactly one poll iteration.
    pub async fn poll_once(
        &self,
        client: &dyn BackingStoreClient,
        index_name: &str,
        page_size: usize,
        keep_alive: Duration,
        index_ready: &IndexReadyFlag,
        state: &StateCell,
    ) -> Result<PollOutcome, NativeUserStoreError> {
        if state.is_stopping_or_stopped() {
            return Ok(PollOutcome::default());
        }
        if !index_ready.get() {
            trace!("security index not ready, skipping poll");
            return Ok(PollOutcome::default());
        }

        let started_at = Instant::now();
        let mut version_map = self.version_map.lock().await;

        // Checkpoint: re-check before diffing, in case stop() raced us to the lock.
        if state.is_stopping_or_stopped() {
            return Ok(PollOutcome::default());
        }

        let mut known_users = version_map.known_usernames();

        let hits = match scroll_all_users(client, index_name, page_size, keep_alive, state).await? {
            ScrollOutcome::Aborted => {
                // The scan was aborted mid-scroll; leave the version map untouched.
                return Ok(PollOutcome::default());
            }
            ScrollOutcome::Complete(hits) => hits,
        };

        let mut changed_users = Vec::new();
        let scanned = hits.len();

        for hit in hits {
            if known_users.remove(&hit.id) {
                match version_map.get(&hit.id) {
                    Some(last_known) if hit.version != last_known => {
                        version_map.bump(&hit.id, hit.version);
                        changed_users.push(hit.id);
                    }
                    Some(_) => {}
                    None => {
                        // Present in known_users but not the map: unreachable
                        // in practice since known_users is derived from it.
                        version_map.bump(&hit.id, hit.version);
                        changed_users.push(hit.id);
                    }
                }
            } else {
                // New to us: record the version, but do not publish a change
                // event for a first observation.
                version_map.insert_new(hit.id, hit.version);
            }
        }

        // Anything still in `known_users` was deleted in the backing store.
        for deleted in known_users {
            version_map.remove(&deleted);
            changed_users.push(deleted);
        }

        self.last_poll_duration_ms
            .store(started_at.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.last_poll_changed_count
            .store(changed_users.len(), Ordering::Relaxed);
        self.has_completed_a_poll.store(true, Ordering::Relaxed);

        debug!(
            scanned,
            changed = changed_users.len(),
            known = version_map.len(),
            "poll iteration complete"
        );

        Ok(PollOutcome {
            changed_users,
            scanned,
        })
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the poller on a fixed delay (measured after the previous iteration
/// completes, not at a fixed rate) until `shutdown_rx` fires or the state
/// cell reports `Stopping`/`Stopped`.
#[allow(clippy::too_many_arguments)]
pub async fn run_fixed_delay(
    poller: Arc<Poller>,
    client: Arc<dyn BackingStoreClient>,
    listeners: Arc<ListenerRegistry>,
    index_name: String,
    page_size: usize,
    keep_alive: Duration,
    reload_interval: Duration,
    index_ready: Arc<IndexReadyFlag>,
    state: Arc<StateCell>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(reload_interval) => {}
            _ = shutdown_rx.recv() => {
                debug!("poller shutting down");
                return;
            }
        }

        if state.get() != LifecycleState::Started {
            continue;
        }

        let outcome = poller
            .poll_once(
                client.as_ref(),
                &index_name,
                page_size,
                keep_alive,
                index_ready.as_ref(),
                state.as_ref(),
            )
            .await;

        match outcome {
            Ok(outcome) if !outcome.changed_users.is_empty() => {
                if let Err(e) = listeners.notify_all(&outcome.changed_users).await {
                    warn!(error = %e, "listener notification failed, continuing on the next tick");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "poll iteration failed, continuing on the next tick");
            }
        }
    }
}
