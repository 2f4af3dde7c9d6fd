use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{NetworkError, Result};

/// Retry accounting for a single logical call.
///
/// Owned by the call that created it, so concurrent calls never share a counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RetryState {
    retries: u32,
    max_retries: u32,
    allow_retry: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RetryDecision {
    /// Wait, then send again. Carries the 1-based retry number.
    Retry(u32),
    Exhausted,
}

impl RetryState {
    pub(crate) fn new(max_retries: u32, allow_retry: bool) -> Self {
        Self {
            retries: 0,
            max_retries,
            allow_retry,
        }
    }

    /// Attempts made so far, counting the one in progress.
    pub(crate) fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Records a connection-level failure and decides what happens next.
    pub(crate) fn on_transient_failure(&mut self) -> RetryDecision {
        if self.allow_retry && self.retries < self.max_retries {
            self.retries += 1;
            RetryDecision::Retry(self.retries)
        } else {
            RetryDecision::Exhausted
        }
    }
}

/// Fixed backoff between attempts. Cancellation cuts the wait short.
pub(crate) async fn wait_before_retry(
    delay: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    cancellable(sleep(delay), cancel).await
}

/// Races `future` against `cancel`, if one was supplied.
pub(crate) async fn cancellable<F: Future>(
    future: F,
    cancel: Option<&CancellationToken>,
) -> Result<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(NetworkError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}
