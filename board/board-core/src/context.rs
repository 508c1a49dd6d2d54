//! Operation Context - Deadlines and Cancellation
//!
//! Every repository call receives an [`OpContext`] from its caller (an HTTP
//! request, a CLI command). Backends wrap their I/O in [`OpContext::run`],
//! which bounds the call by the earlier of the caller's deadline and the
//! backend's per-operation timeout, and aborts it as soon as the caller's
//! cancellation token fires.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::storage::{StorageError, StorageResult};

/// Caller-supplied deadline and cancellation signal.
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OpContext {
    /// A context with no deadline that is never cancelled by the caller.
    ///
    /// Backends still apply their own per-operation timeout.
    #[must_use]
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context tied to an existing cancellation token.
    #[must_use]
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    /// Tighten the deadline to `timeout` from now.
    ///
    /// An earlier deadline already set on the context is kept.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline to `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// The caller's deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The caller's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the caller has already cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` bounded by this context and `timeout`.
    ///
    /// # Errors
    /// Returns [`StorageError::Cancelled`] if the token fires first,
    /// [`StorageError::DeadlineExceeded`] if the effective deadline elapses
    /// first, and otherwise whatever `fut` returns.
    pub async fn run<T, F>(
        &self,
        operation: &'static str,
        timeout: Duration,
        fut: F,
    ) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled { operation });
        }

        let now = Instant::now();
        let per_call = now + timeout;
        let deadline = self.deadline.map_or(per_call, |d| d.min(per_call));
        let timeout_ms =
            u64::try_from(deadline.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX);

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(operation, "operation cancelled by caller");
                Err(StorageError::Cancelled { operation })
            }
            outcome = tokio::time::timeout_at(deadline, fut) => {
                outcome.unwrap_or_else(|_| {
                    tracing::debug!(operation, timeout_ms, "operation deadline exceeded");
                    Err(StorageError::DeadlineExceeded { operation, timeout_ms })
                })
            }
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}
