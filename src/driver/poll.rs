//! Poll-until-done helper with a deadline and cooperative cancellation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a poll loop stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The driver's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// The condition did not hold within the allotted time.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Paces a poll loop. Call [Poller::tick] each time the condition being
/// waited for does not hold yet.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Poller {
    /// Start polling every `interval`, giving up after `timeout` if set.
    pub fn new(interval: Duration, timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            interval,
            timeout,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            cancel,
        }
    }

    /// Fail if cancellation was requested.
    pub fn check(&self) -> Result<(), PollError> {
        if self.cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        Ok(())
    }

    /// Wait one interval, never past the deadline.
    pub async fn tick(&mut self) -> Result<(), PollError> {
        self.check()?;

        let wait = match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(PollError::TimedOut(timeout));
                }
                self.interval.min(deadline - now)
            }
            _ => self.interval,
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(PollError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
