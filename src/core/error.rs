// src/core/error.rs

//! Defines the primary error type for the native user store.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures surfaced by the store.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum NativeUserStoreError {
    /// Returned when an operation other than `start`/`can_start` is called before
    /// the store has reached the `Started` state, or after it has stopped.
    #[error("native user store has not been started")]
    NotStarted,

    /// The backing document store rejected or failed a write. Read-path callers
    /// never see this variant directly; it is suppressed into `None`/empty results.
    #[error("backing store unavailable: {0}")]
    BackingStoreUnavailable(Arc<anyhow::Error>),

    /// A decode failure for a single stored document. Never surfaced to callers;
    /// retained here only so internal logging can format it uniformly.
    #[error("failed to decode user record: {0}")]
    Decode(String),

    /// A mutation's write succeeded but the subsequent realm-cache purge failed.
    #[error("cache purge failed for user '{username}', clear the realm cache manually: {cause}")]
    CachePurgeFailed {
        username: String,
        cause: Arc<anyhow::Error>,
    },

    /// A lifecycle operation failed unexpectedly; the store transitions to `Failed`.
    #[error("fatal lifecycle error: {0}")]
    Fatal(String),

    /// Raised by the poller scheduler when at least one listener panicked or
    /// returned an error while processing a change event.
    #[error("listener failed while handling a change event: {0}")]
    ListenerFailure(String),

    /// Attempted an illegal lifecycle transition, or called `reset` outside of
    /// `Stopped`/`Failed`.
    #[error("illegal lifecycle transition: {0}")]
    IllegalTransition(String),

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<anyhow::Error> for NativeUserStoreError {
    fn from(e: anyhow::Error) -> Self {
        NativeUserStoreError::BackingStoreUnavailable(Arc::new(e))
    }
}

impl From<serde_json::Error> for NativeUserStoreError {
    fn from(e: serde_json::Error) -> Self {
        NativeUserStoreError::Decode(e.to_string())
    }
}
