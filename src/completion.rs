use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::poll::{Deadline, PollOutcome, PollPolicy};
use crate::resolver::FuzzyResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Present,
    /// Wait budget ran out without the file showing up (lenient mode only)
    TimedOut,
}

/// Waits for a fetched file to show up in the download directory.
pub struct CompletionPoller {
    resolver: Arc<FuzzyResolver>,
    policy: PollPolicy,
}

impl CompletionPoller {
    /// In strict mode an exhausted wait budget is an error instead of a
    /// logged `Completion::TimedOut`.
    pub fn new(resolver: Arc<FuzzyResolver>, policy: PollPolicy, strict: bool) -> Self {
        let deadline = if strict { Deadline::Hard } else { Deadline::Soft };
        Self {
            resolver,
            policy: policy.with_deadline(deadline),
        }
    }

    pub async fn await_completion(&self, expected: &str, dir: &Path) -> Result<Completion> {
        let resolver = &self.resolver;
        let outcome = self
            .policy
            .wait_until(expected, move |_| resolver.exists_async(expected, dir))
            .await?;

        let path = dir.join(expected);
        match outcome {
            PollOutcome::Ready { .. } => {
                info!(path = %path.display(), "Downloaded");
                Ok(Completion::Present)
            }
            PollOutcome::Expired { waited } => {
                warn!(
                    path = %path.display(),
                    waited_secs = waited.as_secs(),
                    "File never showed up, reporting it as downloaded"
                );
                Ok(Completion::TimedOut)
            }
        }
    }
}
