// src/core/store.rs

//! The native user store: the public lifecycle controller and read/write API
//! tying the state machine, version map, listener registry, poller, and
//! external collaborators together.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use crate::config::StoreConfig;
use crate::core::backing_store::{BackingStoreClient, BackingStoreError};
use crate::core::blocking::block_on_with_timeout;
use crate::core::error::NativeUserStoreError;
use crate::core::hasher::PasswordHasher;
use crate::core::listener::{ChangeListener, ListenerRegistry};
use crate::core::metrics::StoreMetrics;
use crate::core::model::{self, User, UserAndPassword, UserRecord};
use crate::core::poller::{self, Poller};
use crate::core::purge::RealmCachePurgeClient;
use crate::core::readiness::{self, ClusterSnapshot, IndexReadyFlag};
use crate::core::state::{LifecycleState, StateCell};

use crate::config::{BLOCKING_READ_TIMEOUT, SECURITY_INDEX_NAME};

/// The native user store. Cheap to clone: every field is an `Arc` or a
/// `Copy` handle, so a clone shares the same running instance -- the same
/// pattern the surrounding framework uses to hand the store to multiple
/// authentication realms without duplicating state.
#[derive(Clone)]
pub struct NativeUserStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    state: Arc<StateCell>,
    index_ready: Arc<IndexReadyFlag>,
    listeners: Arc<ListenerRegistry>,
    poller: Arc<Poller>,
    backing_store: Arc<dyn BackingStoreClient>,
    purge_client: Arc<dyn RealmCachePurgeClient>,
    hasher: Arc<dyn PasswordHasher>,
    runtime: Handle,
    shutdown_tx: broadcast::Sender<()>,
    purge_failures: std::sync::atomic::AtomicU64,
}

impl NativeUserStore {
    pub fn new(
        config: StoreConfig,
        backing_store: Arc<dyn BackingStoreClient>,
        purge_client: Arc<dyn RealmCachePurgeClient>,
        hasher: Arc<dyn PasswordHasher>,
        runtime: Handle,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Arc::new(StateCell::default()),
                index_ready: Arc::new(IndexReadyFlag::new()),
                listeners: Arc::new(ListenerRegistry::new()),
                poller: Arc::new(Poller::new()),
                backing_store,
                purge_client,
                hasher,
                runtime,
                shutdown_tx,
                purge_failures: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Registers a listener notified with the set of usernames that changed
    /// on every poll iteration that detects a difference. May be called
    /// before or after `start()`.
    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.inner.listeners.register(listener);
    }

    /// Whether the store may leave `Initialized`, given the latest cluster
    /// snapshot. `is_master` is accepted for parity with the operation this
    /// is grounded on but does not gate the result: every clause this store
    /// checks is cluster-state, not node-role, dependent. The public
    /// contract is a bare bool; the reason is logged internally but never
    /// returned.
    pub fn can_start(&self, snapshot: &ClusterSnapshot, _is_master: bool) -> bool {
        if self.inner.state.get() != LifecycleState::Initialized {
            trace!(state = %self.inner.state.get(), "not ready to start: already left Initialized");
            return false;
        }
        match readiness::evaluate_readiness(snapshot) {
            Ok(()) => true,
            Err(reason) => {
                trace!(?reason, "not ready to start");
                false
            }
        }
    }

    /// Called by the surrounding framework whenever the cluster state
    /// changes. Recomputes the `indexReady` flag that gates the poller;
    /// does not itself drive lifecycle transitions.
    pub fn on_cluster_changed(&self, snapshot: &ClusterSnapshot) {
        self.inner.index_ready.update(snapshot);
    }

    /// Transitions `Initialized -> Starting -> Started`, performs one
    /// synchronous poll (errors are logged, not fatal), and schedules the
    /// background poller. A second call while already started or starting
    /// is a silent no-op (mirrors `StateCell::compare_and_transition`).
    pub async fn start(&self) -> Result<(), NativeUserStoreError> {
        if !self
            .inner
            .state
            .compare_and_transition(LifecycleState::Initialized, LifecycleState::Starting)
        {
            trace!(state = %self.inner.state.get(), "start() ignored: not in Initialized");
            return Ok(());
        }

        if let Err(e) = self
            .inner
            .poller
            .poll_once(
                self.inner.backing_store.as_ref(),
                SECURITY_INDEX_NAME,
                self.inner.config.scroll_size,
                self.inner.config.scroll_keep_alive,
                self.inner.index_ready.as_ref(),
                self.inner.state.as_ref(),
            )
            .await
        {
            warn!(error = %e, "initial poll during start() failed, continuing anyway");
        }

        if !self
            .inner
            .state
            .compare_and_transition(LifecycleState::Starting, LifecycleState::Started)
        {
            self.inner.state.force(LifecycleState::Failed);
            return Err(NativeUserStoreError::Fatal(
                "lost the Starting state to a concurrent transition".into(),
            ));
        }

        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        self.inner.runtime.spawn(poller::run_fixed_delay(
            self.inner.poller.clone(),
            self.inner.backing_store.clone(),
            self.inner.listeners.clone(),
            SECURITY_INDEX_NAME.to_string(),
            self.inner.config.scroll_size,
            self.inner.config.scroll_keep_alive,
            self.inner.config.reload_interval,
            self.inner.index_ready.clone(),
            self.inner.state.clone(),
            shutdown_rx,
        ));

        info!("native user store started");
        Ok(())
    }

    /// Transitions towards `Stopped`, signaling the poller to abort any
    /// in-flight scroll and exit its loop. Idempotent.
    pub fn stop(&self) {
        if self
            .inner
            .state
            .compare_and_transition(LifecycleState::Started, LifecycleState::Stopping)
            || self.inner.state.get() == LifecycleState::Stopping
        {
            let _ = self.inner.shutdown_tx.send(());
            self.inner.state.force(LifecycleState::Stopped);
            info!("native user store stopped");
        }
    }

    /// Test-only: forces the store back to `Initialized` and clears the
    /// version map and listener registry. Only valid from `Stopped`/`Failed`.
    pub async fn reset(&self) -> Result<(), NativeUserStoreError> {
        match self.inner.state.get() {
            LifecycleState::Stopped | LifecycleState::Failed => {}
            other => {
                return Err(NativeUserStoreError::IllegalTransition(format!(
                    "reset() requires Stopped or Failed, found {other}"
                )));
            }
        }
        self.inner.poller.clear().await;
        self.inner.listeners.clear();
        self.inner
            .purge_failures
            .store(0, std::sync::atomic::Ordering::SeqCst);
        self.inner.state.force(LifecycleState::Initialized);
        Ok(())
    }

    fn require_started(&self) -> Result<(), NativeUserStoreError> {
        if self.inner.state.is_started() {
            Ok(())
        } else {
            Err(NativeUserStoreError::NotStarted)
        }
    }

    /// Fetches a single user and password hash. `Ok(None)` covers both a
    /// clean miss and a missing security index; only a genuine backing-store
    /// failure is an `Err`.
    pub async fn get_user(&self, username: &str) -> Result<Option<UserAndPassword>, NativeUserStoreError> {
        self.require_started()?;
        match self.inner.backing_store.get(SECURITY_INDEX_NAME, username).await {
            Ok(Some(hit)) => match model::decode(username, &hit.source) {
                Some(record) => Ok(Some(record.into_user_and_password())),
                None => {
                    warn!(username, "stored document failed to decode, treating as absent");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(BackingStoreError::IndexNotFound) => Ok(None),
            Err(BackingStoreError::Other(e)) => Err(e.into()),
        }
    }

    /// Synchronous read-path surface for callers outside an async context.
    /// Never propagates an error: a timed-out or failed lookup reads
    /// identically to "user not found".
    pub fn get_user_blocking(&self, username: &str) -> Option<UserAndPassword> {
        let store = self.clone();
        let username = username.to_string();
        block_on_with_timeout(
            &self.inner.runtime,
            async move { store.get_user(&username).await.ok().flatten() },
            BLOCKING_READ_TIMEOUT,
        )
        .flatten()
    }

    /// Verifies a plaintext password against the stored hash for `username`.
    /// Returns the authenticated user (hash excluded) on success; `None` for
    /// a missing user, a failed lookup, or a wrong password -- the caller
    /// cannot distinguish between the three.
    pub fn verify_password(&self, username: &str, plaintext: &str) -> Option<User> {
        let user_and_password = self.get_user_blocking(username)?;
        if self
            .inner
            .hasher
            .verify(plaintext, user_and_password.password_hash())
        {
            Some(user_and_password.user)
        } else {
            None
        }
    }

    /// Scans the full user set (or, if `usernames` is non-empty, filters the
    /// scan to that subset), accumulating decoded users across scroll pages.
    /// A missing security index reads as an empty sequence, not an error.
    pub async fn get_users(&self, usernames: &[String]) -> Result<Vec<User>, NativeUserStoreError> {
        self.require_started()?;

        let filter: Option<std::collections::HashSet<&str>> = if usernames.is_empty() {
            None
        } else {
            Some(usernames.iter().map(String::as_str).collect())
        };

        let keep_alive_secs = self.inner.config.scroll_keep_alive.as_secs();
        let mut users = Vec::new();

        let first_page = match self
            .inner
            .backing_store
            .search(SECURITY_INDEX_NAME, self.inner.config.scroll_size, keep_alive_secs)
            .await
        {
            Ok(page) => page,
            Err(BackingStoreError::IndexNotFound) => return Ok(Vec::new()),
            Err(BackingStoreError::Other(e)) => return Err(e.into()),
        };

        let mut scroll_id = first_page.scroll_id;
        let mut hits = first_page.hits;

        let scan_result: Result<(), NativeUserStoreError> = async {
            loop {
                for hit in hits.drain(..) {
                    if filter.as_ref().is_some_and(|f| !f.contains(hit.id.as_str())) {
                        continue;
                    }
                    match model::decode(&hit.id, &hit.source) {
                        Some(record) => users.push(record.into_user_and_password().user),
                        None => warn!(username = %hit.id, "stored document failed to decode, skipping"),
                    }
                }
                let Some(id) = scroll_id.clone() else {
                    break;
                };
                let page = self
                    .inner
                    .backing_store
                    .search_scroll(&id, keep_alive_secs)
                    .await
                    .map_err(|e| match e {
                        BackingStoreError::IndexNotFound => {
                            anyhow!("index not found mid-scroll")
                        }
                        BackingStoreError::Other(e) => e,
                    })?;
                hits = page.hits;
                scroll_id = page.scroll_id;
            }
            Ok(())
        }
        .await;

        if let Some(id) = scroll_id {
            if let Err(e) = self.inner.backing_store.clear_scroll(&[id]).await {
                warn!(error = %e, "best-effort clear-scroll failed");
            }
        }

        scan_result?;
        Ok(users)
    }

    /// Creates or updates a user. A create short-circuits without a cache
    /// purge (nothing could have been cached for a user that didn't exist
    /// yet); an update always triggers exactly one purge after the write.
    pub async fn put(
        &self,
        user: &User,
        password_hash: &str,
        refresh: bool,
    ) -> Result<(), NativeUserStoreError> {
        self.require_started()?;

        let record = UserRecord {
            username: user.username.clone(),
            password_hash: password_hash.to_string(),
            roles: user.roles.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            metadata: user.metadata.clone(),
        };
        let doc = model::encode(&record);

        let result = self
            .inner
            .backing_store
            .index(SECURITY_INDEX_NAME, &user.username, doc, refresh)
            .await
            .map_err(|e| match e {
                BackingStoreError::IndexNotFound => {
                    NativeUserStoreError::from(anyhow!("security index does not exist"))
                }
                BackingStoreError::Other(e) => e.into(),
            })?;

        if !result.created {
            self.purge_one(&user.username).await?;
        }

        Ok(())
    }

    /// Deletes a user. Always purges the realm cache regardless of whether
    /// the document was found -- a stale cache entry is possible even after
    /// a delete that raced an earlier failed purge.
    pub async fn delete(&self, username: &str, refresh: bool) -> Result<bool, NativeUserStoreError> {
        self.require_started()?;

        let result = self
            .inner
            .backing_store
            .delete(SECURITY_INDEX_NAME, username, refresh)
            .await
            .map_err(|e| match e {
                BackingStoreError::IndexNotFound => {
                    NativeUserStoreError::from(anyhow!("security index does not exist"))
                }
                BackingStoreError::Other(e) => e.into(),
            })?;

        self.purge_one(username).await?;

        Ok(result.found)
    }

    async fn purge_one(&self, username: &str) -> Result<(), NativeUserStoreError> {
        if let Err(e) = self.inner.purge_client.clear_realm_cache(&[username.to_string()]).await {
            self.inner
                .purge_failures
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            return Err(NativeUserStoreError::CachePurgeFailed {
                username: username.to_string(),
                cause: Arc::new(e),
            });
        }
        Ok(())
    }

    /// A point-in-time snapshot of store-level counters, for the surrounding
    /// framework's own observability -- not a metrics server of our own.
    pub async fn metrics(&self) -> StoreMetrics {
        let (last_poll_duration, last_poll_changed_count) = self.inner.poller.last_poll_stats();
        StoreMetrics {
            known_users: self.inner.poller.known_user_count().await,
            purge_failures: self.inner.purge_failures.load(std::sync::atomic::Ordering::SeqCst),
            last_poll_duration,
            last_poll_changed_count,
        }
    }
}
