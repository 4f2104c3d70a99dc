// src/core/backing_store.rs

//! The external indexed document store, as an interface.
//!
//! Only the operations the store actually calls are named here: point
//! lookup, whole-document index, delete, and scrolled search. Concrete
//! clients (a real document-store SDK, or a test fake) implement this trait;
//! the store itself never depends on a specific backing-store crate.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A single document as returned from `get` or a scan hit.
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub id: String,
    pub version: u64,
    pub source: Map<String, Value>,
}

/// The outcome of a whole-document `index` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexResult {
    /// `true` if this write created a new document; `false` if it overwrote
    /// an existing one.
    pub created: bool,
}

/// The outcome of a `delete` by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub found: bool,
}

/// One page of a scrolled search.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub hits: Vec<DocumentHit>,
    /// `None` once the scroll is exhausted.
    pub scroll_id: Option<String>,
}

/// Errors a backing-store client can surface. `IndexNotFound` is
/// distinguished because the read path and the poller suppress it (a
/// missing index reads as "no users yet", not a failure); every other
/// variant propagates on the write path and the initial search.
#[derive(Debug, thiserror::Error)]
pub enum BackingStoreError {
    #[error("index not found")]
    IndexNotFound,
    #[error("backing store error: {0}")]
    Other(#[from] anyhow::Error),
}

/// The backing document store's client surface, as used by this crate.
///
/// All reads set `ignore_unavailable` semantics at the call site in the
/// concrete client (not modeled here as a parameter, since it is a fixed
/// policy of this store, not a per-call choice).
#[async_trait]
pub trait BackingStoreClient: Send + Sync {
    /// Point lookup by primary key. Returns `Ok(None)` for a clean miss;
    /// `Err(IndexNotFound)` when the index itself does not exist.
    async fn get(&self, index: &str, id: &str) -> Result<Option<DocumentHit>, BackingStoreError>;

    /// Writes the full document as a whole-document index (never a partial
    /// update). `refresh` requests the write be visible to subsequent reads
    /// before the call returns.
    async fn index(
        &self,
        index: &str,
        id: &str,
        source: Map<String, Value>,
        refresh: bool,
    ) -> Result<IndexResult, BackingStoreError>;

    /// Deletes by primary key. `found` is `false`, not an error, when the
    /// document did not exist.
    async fn delete(
        &self,
        index: &str,
        id: &str,
        refresh: bool,
    ) -> Result<DeleteResult, BackingStoreError>;

    /// Opens a scrolled search over every document in the index, requesting
    /// version metadata. `Err(IndexNotFound)` is translated by callers into
    /// an empty result set.
    async fn search(
        &self,
        index: &str,
        size: usize,
        keep_alive_secs: u64,
    ) -> Result<ScrollPage, BackingStoreError>;

    /// Continues a previously opened scroll.
    async fn search_scroll(
        &self,
        scroll_id: &str,
        keep_alive_secs: u64,
    ) -> Result<ScrollPage, BackingStoreError>;

    /// Best-effort release of one or more scroll cursors. Failures here are
    /// logged by the caller, never propagated.
    async fn clear_scroll(&self, scroll_ids: &[String]) -> Result<(), BackingStoreError>;
}
