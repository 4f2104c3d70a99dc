// src/core/purge.rs

//! The realm-cache purge client: the only external collaborator the
//! mutation path calls after a successful write.

use async_trait::async_trait;

/// Capability to invalidate cached credentials for a set of usernames
/// across every node of the cluster. Called after every non-create
/// mutation (`put` of an existing user, every `delete`).
#[async_trait]
pub trait RealmCachePurgeClient: Send + Sync {
    /// Requests that all realms drop any cached entry for `usernames`.
    /// A non-acknowledged response from a node is treated as success as
    /// long as no error is raised; only an `Err` here becomes
    /// `NativeUserStoreError::CachePurgeFailed`.
    async fn clear_realm_cache(&self, usernames: &[String]) -> anyhow::Result<()>;
}
