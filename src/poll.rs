//! Bounded retry loop shared by the disk-space gate and the completion poller.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FetchError, Result};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What happens when the wait budget runs out.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Deadline {
    /// Report expiry and let the caller carry on
    #[default]
    Soft,
    /// Turn expiry into `FetchError::DeadlineExceeded`
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { waited: Duration },
    Expired { waited: Duration },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn waited(&self) -> Duration {
        match self {
            Self::Ready { waited } | Self::Expired { waited } => *waited,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff: f64,
    pub max_wait: Duration,
    pub deadline: Deadline,
}

impl PollPolicy {
    /// Poll every `interval` until `max_wait` has passed.
    pub fn fixed(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
            max_wait,
            deadline: Deadline::Soft,
        }
    }

    /// Grow the sleep by `factor` after each attempt, never past `cap`.
    pub fn with_backoff(mut self, factor: f64, cap: Duration) -> Self {
        self.backoff = factor.max(1.0);
        self.max_interval = cap.max(self.interval);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.backoff)
            .min(self.max_interval)
            .max(MIN_INTERVAL)
    }

    /// Run `probe` until it reports true or the wait budget is spent.
    ///
    /// The probe is always evaluated once more after the last sleep, so a
    /// condition that becomes true right at the deadline still counts as ready.
    /// `probe` receives the time waited so far. Intervals shorter than one
    /// second are raised to one second.
    pub async fn wait_until<F, Fut>(&self, what: &str, mut probe: F) -> Result<PollOutcome>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        let mut interval = self.interval.max(MIN_INTERVAL);
        loop {
            let waited = started.elapsed();
            if probe(waited).await? {
                return Ok(PollOutcome::Ready { waited });
            }
            if waited >= self.max_wait {
                return match self.deadline {
                    Deadline::Soft => Ok(PollOutcome::Expired { waited }),
                    Deadline::Hard => Err(FetchError::DeadlineExceeded {
                        what: what.to_string(),
                        waited,
                    }),
                };
            }
            debug!(what, waited_secs = waited.as_secs(), "Still waiting");
            tokio::time::sleep(interval).await;
            interval = self.next_interval(interval);
        }
    }
}
