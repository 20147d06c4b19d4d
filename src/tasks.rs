//! Side-effect task queue
//!
//! Notifications and real-time pushes run as detached tasks so the write path
//! returns as soon as its primary atomic update completes. A failing or
//! panicking task is logged and never reaches the submitter.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::types::Result;

/// Task queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub submitted: u64,
    pub failed: u64,
    pub in_flight: usize,
}

struct Inner {
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

/// Fire-and-forget task submission
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                in_flight: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Run `task` in the background. Must be called from within a tokio runtime.
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let task: BoxFuture<'static, Result<()>> = Box::pin(task);
        let inner = Arc::clone(&self.inner);
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.submitted.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            // Inner spawn so a panic surfaces as a JoinError instead of
            // leaking the in-flight count
            match tokio::spawn(task).await {
                Ok(Ok(())) => debug!(task = name, "Task completed"),
                Ok(Err(e)) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task = name, error = %e, "Task failed");
                }
                Err(e) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    error!(task = name, error = %e, "Task panicked");
                }
            }

            if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Wait until every submitted task has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats {
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
