//! Retry policies for `FLOOD_WAIT`, timeouts and lost connections.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::InvocationError;

/// Controls how the client reacts when an RPC call fails.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        InvocationError,
}

/// Never retry.
pub struct NoRetries;
impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Retry timeouts and dropped connections with exponential backoff, and
/// sleep through `FLOOD_WAIT` when it is short enough. Both share the
/// `max_retries` budget.
pub struct AutoSleep {
    pub max_retries:     u32,
    pub backoff_base:    Duration,
    pub backoff_cap:     Duration,
    /// Longer `FLOOD_WAIT`s are returned to the caller.
    pub flood_threshold: Duration,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self {
            max_retries:     3,
            backoff_base:    Duration::from_millis(200),
            backoff_cap:     Duration::from_secs(5),
            flood_threshold: Duration::from_secs(60),
        }
    }
}

impl AutoSleep {
    /// Delay before retry number `n` (1-based).
    pub fn backoff(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        let n = ctx.fail_count.get();
        if n > self.max_retries {
            return ControlFlow::Break(());
        }
        if let Some(secs) = ctx.error.flood_wait_seconds() {
            if secs <= self.flood_threshold.as_secs() {
                tracing::info!("[tgmedia] FLOOD_WAIT_{secs}, sleeping before retry");
                return ControlFlow::Continue(Duration::from_secs(secs));
            }
            return ControlFlow::Break(());
        }
        if ctx.error.is_transient() {
            let delay = self.backoff(n);
            tracing::debug!("[tgmedia] retry {n} in {delay:?} after: {}", ctx.error);
            return ControlFlow::Continue(delay);
        }
        ControlFlow::Break(())
    }
}

/// The error a caller sees once the policy gives up.
pub(crate) fn final_error(last: InvocationError, attempts: u32, all_timed_out: bool) -> InvocationError {
    match last {
        InvocationError::TimedOut { .. } if all_timed_out => InvocationError::TimedOut { attempts },
        e if e.is_transient() && attempts > 1 => {
            InvocationError::CallFailed { attempts, last: Box::new(e) }
        }
        e => e,
    }
}
