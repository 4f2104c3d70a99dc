// src/core/blocking.rs

//! A thin blocking bridge over an async call, used only by the two read-path
//! surfaces that must present a synchronous API (`get_user_blocking`,
//! `verify_password`) to callers outside an async context.
//!
//! Implemented as a single-slot completion: the async operation is spawned
//! onto the runtime, and the calling thread blocks on a `std::sync::mpsc`
//! channel with a bounded wait. No thread-local state is involved.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::warn;

/// Runs `fut` to completion on `handle`, blocking the current thread for at
/// most `timeout`. Returns `None` on timeout, on interruption, or if the
/// spawned task panicked. The only two callers (`get_user_blocking`,
/// `verify_password`) treat a failed wait identically to "user not found".
pub fn block_on_with_timeout<T, F>(handle: &Handle, fut: F, timeout: Duration) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    handle.spawn(async move {
        let result = fut.await;
        // The receiver may already have timed out and been dropped; that's fine.
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(value) => Some(value),
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
            warn!(?timeout, "blocking read timed out");
            None
        }
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
            warn!("blocking read's async task ended without a result");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_the_value_when_the_future_completes_in_time() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = block_on_with_timeout(
            runtime.handle(),
            async { 42 },
            Duration::from_secs(1),
        );
        assert_eq!(result, Some(42));
    }

    #[test]
    fn returns_none_on_timeout() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Option<()> = block_on_with_timeout(
            runtime.handle(),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
            Duration::from_millis(50),
        );
        assert_eq!(result, None);
    }
}
