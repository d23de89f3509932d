//! Operation context for storage operations.
//!
//! This module defines [`OperationContext`], which every storage operation
//! takes as its first parameter. The context carries an optional deadline and
//! a cancellation signal. Operations check it on entry, bound each store
//! round-trip by the remaining time, and check it again once the store
//! answers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{BackendError, ContextError, StorageResult};

#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            // Register before reading the flag so a concurrent cancel is not lost.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle used to cancel every operation running under a context.
///
/// Cancellation is sticky: once cancelled, the context stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<CancelSignal>,
}

impl CancelHandle {
    /// Cancels the context. Pending store calls are abandoned and report
    /// [`ContextError::Cancelled`].
    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::Release);
        self.signal.notify.notify_waiters();
    }

    /// Returns `true` if [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }
}

/// Deadline and cancellation scope for a storage operation.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use resource_persistence::OperationContext;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ctx = OperationContext::new().with_timeout(Duration::from_secs(5));
/// assert!(ctx.check().is_ok());
/// assert!(ctx.remaining().unwrap() <= Duration::from_secs(5));
///
/// let (ctx, handle) = OperationContext::new().with_cancellation();
/// handle.cancel();
/// assert!(ctx.check().is_err());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// When the operation must be finished.
    deadline: Option<Instant>,
    /// Shared cancellation state, if the context is cancellable.
    signal: Option<Arc<CancelSignal>>,
    /// Optional correlation ID for request tracing.
    correlation_id: Option<String>,
}

impl OperationContext {
    /// Creates a context with no deadline that cannot be cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline to `timeout` from now.
    ///
    /// An earlier deadline already set on the context is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline, keeping an earlier one if present.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Makes the context cancellable and returns the handle that cancels it.
    ///
    /// Clones of the returned context share the same cancellation state.
    pub fn with_cancellation(mut self) -> (Self, CancelHandle) {
        let signal = self
            .signal
            .get_or_insert_with(|| Arc::new(CancelSignal::default()))
            .clone();
        (self, CancelHandle { signal })
    }

    /// Creates a context with the specified correlation ID for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the time left before the deadline, saturating at zero.
    ///
    /// `None` means the context has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason the context is no longer usable, if any.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.signal.as_ref().is_some_and(|s| s.is_cancelled()) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fails if the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs a store call bounded by this context.
    ///
    /// The call is abandoned as soon as the context is cancelled or the
    /// deadline passes, in which case the matching [`ContextError`] is
    /// returned instead of the store's answer.
    pub async fn run<F, T>(&self, call: F) -> StorageResult<T>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        self.check()?;

        let cancelled = async {
            match &self.signal {
                Some(signal) => signal.wait().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = call => Ok(result?),
            _ = cancelled => Err(ContextError::Cancelled.into()),
            _ = expired => Err(ContextError::DeadlineExceeded.into()),
        }
    }
}
