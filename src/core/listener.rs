// src/core/listener.rs

//! The append-only listener registry the poller notifies after every poll
//! iteration that detects changes.
//!
//! The list uses copy-on-write semantics: registration clones the current
//! `Vec`, appends to the clone, and swaps it in under a short-lived write
//! lock. Iteration over a snapshot therefore never observes a concurrent
//! append and never blocks a registration that happens mid-iteration.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::core::error::NativeUserStoreError;

/// A capability notified with the set of usernames that changed or were
/// deleted since the previous poll. Registered before or after `start()`;
/// invoked only by the poller, never concurrently with itself for the same
/// poll iteration (listeners are invoked in registration order).
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_users_changed(&self, changed: &[String]) -> anyhow::Result<()>;
}

/// Append-only, copy-on-write registry of [`ChangeListener`]s.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Arc<Vec<Arc<dyn ChangeListener>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Appends a listener. Existing iterators (e.g. an in-flight poll
    /// notification) keep seeing the snapshot they started with.
    pub fn register(&self, listener: Arc<dyn ChangeListener>) {
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// A stable snapshot of the currently registered listeners.
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn ChangeListener>>> {
        self.listeners.read().clone()
    }

    /// Test-only: drops every registered listener, as part of lifecycle `reset()`.
    pub fn clear(&self) {
        *self.listeners.write() = Arc::new(Vec::new());
    }

    /// Invokes every listener in registration order with the frozen change
    /// set. Every listener is offered the event regardless of earlier
    /// failures; the first failure is returned to the caller (the poller
    /// scheduler), later failures are logged as suppressed.
    pub async fn notify_all(&self, changed: &[String]) -> Result<(), NativeUserStoreError> {
        let snapshot = self.snapshot();
        let mut first_failure: Option<anyhow::Error> = None;

        for listener in snapshot.iter() {
            if let Err(e) = listener.on_users_changed(changed).await {
                match first_failure {
                    None => first_failure = Some(e),
                    Some(_) => {
                        warn!(error = %e, "suppressed: a later change listener also failed");
                    }
                }
            }
        }

        match first_failure {
            Some(e) => Err(NativeUserStoreError::ListenerFailure(e.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChangeListener for CountingListener {
        async fn on_users_changed(&self, _changed: &[String]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl ChangeListener for FailingListener {
        async fn on_users_changed(&self, _changed: &[String]) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    #[tokio::test]
    async fn notifies_every_listener_in_registration_order() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(CountingListener { calls: calls.clone() }));
        registry.register(Arc::new(CountingListener { calls: calls.clone() }));

        registry.notify_all(&["alice".into()]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failing_listener_does_not_prevent_later_listeners_from_running() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(FailingListener));
        registry.register(Arc::new(CountingListener { calls: calls.clone() }));

        let result = registry.notify_all(&["alice".into()]).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_during_iteration_does_not_affect_the_in_flight_snapshot() {
        let registry = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(CountingListener { calls: calls.clone() }));

        let snapshot = registry.snapshot();
        registry.register(Arc::new(CountingListener { calls: calls.clone() }));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
