//! Dedicated I/O runtime thread with a synchronous bridge.
//!
//! All network I/O lives on one single-threaded tokio runtime running on a
//! private thread. Synchronous callers submit futures through
//! `block_on_remote` and wait for the result; the bridge refuses to run
//! from inside any tokio context so the runtime can never deadlock on
//! itself.

use std::future::Future;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{MarketError, MarketResult};

/// Bound on joining the runtime thread at shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to the private I/O event loop.
pub struct IoRuntime {
    handle: Handle,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl IoRuntime {
    /// Build the runtime and park it on a named thread.
    pub fn start(thread_name: &str) -> MarketResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MarketError::RuntimeStart(e.to_string()))?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                // Parking on the stop signal keeps the reactor alive and
                // drives every spawned task; dropping the runtime afterwards
                // cancels whatever is still pending.
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                debug!("I/O runtime thread exiting");
            })
            .map_err(|e| MarketError::RuntimeStart(e.to_string()))?;

        Ok(Self {
            handle,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Spawn a task onto the I/O runtime without waiting for it.
    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Run a future on the I/O runtime and block the calling thread on its
    /// result.
    ///
    /// Fails fast when invoked from within any tokio context: blocking a
    /// runtime worker on another runtime is a deadlock waiting to happen.
    pub fn block_on_remote<F>(&self, fut: F) -> MarketResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.block_on_remote_timeout(fut, None)
    }

    /// `block_on_remote` with an optional wait bound.
    pub fn block_on_remote_timeout<F>(
        &self,
        fut: F,
        timeout: Option<Duration>,
    ) -> MarketResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(MarketError::ReentrantBlockOn);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.handle.spawn(async move {
            let _ = tx.send(fut.await);
        });

        match timeout {
            Some(bound) => rx
                .recv_timeout(bound)
                .map_err(|_| MarketError::BridgeTimeout),
            None => rx.recv().map_err(|_| MarketError::BridgeClosed),
        }
    }

    /// Signal the loop to stop and join its thread with a bounded wait.
    pub fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if thread.is_finished() {
            let _ = thread.join();
        } else {
            warn!("I/O runtime thread did not stop within bound; detaching");
        }
    }
}

impl Drop for IoRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_round_trip() {
        let runtime = IoRuntime::start("io-test").unwrap();
        let out = runtime.block_on_remote(async { 2 + 2 }).unwrap();
        assert_eq!(out, 4);
    }

    #[test]
    fn test_bridge_timeout() {
        let runtime = IoRuntime::start("io-test").unwrap();
        let result = runtime.block_on_remote_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
            Some(Duration::from_millis(50)),
        );
        assert!(matches!(result, Err(MarketError::BridgeTimeout)));
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let runtime = IoRuntime::start("io-test").unwrap();
        let ambient = tokio::runtime::Runtime::new().unwrap();
        let result = ambient.block_on(async {
            // From inside a runtime the bridge must refuse to block.
            runtime.block_on_remote(async { 1 })
        });
        assert!(matches!(result, Err(MarketError::ReentrantBlockOn)));
    }

    #[test]
    fn test_shutdown_joins_thread() {
        let mut runtime = IoRuntime::start("io-test").unwrap();
        runtime.block_on_remote(async {}).unwrap();
        runtime.shutdown();
        // Second shutdown is a no-op.
        runtime.shutdown();
    }
}
