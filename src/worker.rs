use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::alias;
use crate::completion::{Completion, CompletionPoller};
use crate::disk::{DiskSpaceGate, SpaceProbe};
use crate::error::FetchError;
use crate::fetch::{file_name_from_url, Fetcher};
use crate::resolver::FuzzyResolver;
use crate::settings::Settings;

/// One url bound to the directory it is downloaded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub file_name: String,
    pub directory: PathBuf,
}

impl DownloadTask {
    pub fn new(url: &str, directory: &Path) -> Result<Self, FetchError> {
        Ok(Self {
            url: url.to_string(),
            file_name: file_name_from_url(url)?,
            directory: directory.to_path_buf(),
        })
    }

    pub fn target(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    AlreadyPresent,
    Downloaded,
    /// Fetched, but the file never showed up within the wait budget
    Unconfirmed,
}

/// Runs a single task: skip if present, wait for disk space, fetch, wait for
/// the file to appear.
pub struct DownloadWorker<F> {
    fetcher: F,
    resolver: Arc<FuzzyResolver>,
    disk_gate: DiskSpaceGate,
    completion: CompletionPoller,
}

impl<F: Fetcher> DownloadWorker<F> {
    pub fn new(
        fetcher: F,
        resolver: Arc<FuzzyResolver>,
        disk_gate: DiskSpaceGate,
        completion: CompletionPoller,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            disk_gate,
            completion,
        }
    }

    pub fn from_settings(fetcher: F, probe: Arc<dyn SpaceProbe>, settings: &Settings) -> Self {
        let resolver = Arc::new(FuzzyResolver::new(
            settings.resolver.window_secs,
            alias::store_for(settings.download.aliases),
        ));
        let disk_gate =
            DiskSpaceGate::new(probe, settings.disk.min_free_bytes(), settings.disk.policy());
        let completion = CompletionPoller::new(
            resolver.clone(),
            settings.completion.policy(),
            settings.completion.strict,
        );
        Self::new(fetcher, resolver, disk_gate, completion)
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn run(&self, task: &DownloadTask) -> Result<TaskOutcome> {
        if self.resolver.exists_async(&task.file_name, &task.directory).await? {
            info!(path = %task.target().display(), "File exists, skip downloading");
            return Ok(TaskOutcome::AlreadyPresent);
        }

        self.disk_gate.await_space(&task.directory).await?;

        info!(url = %task.url, "Start downloading");
        self.fetcher.fetch(&task.url, &task.directory).await?;

        let outcome = match self
            .completion
            .await_completion(&task.file_name, &task.directory)
            .await?
        {
            Completion::Present => TaskOutcome::Downloaded,
            Completion::TimedOut => TaskOutcome::Unconfirmed,
        };
        Ok(outcome)
    }
}

/// Worker wired with short polls, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn test_worker<F: Fetcher>(fetcher: F, free_bytes: u64) -> DownloadWorker<F> {
    struct FixedSpace(u64);

    impl SpaceProbe for FixedSpace {
        fn free_bytes(&self, _dir: &Path) -> crate::error::Result<u64> {
            Ok(self.0)
        }
    }

    let resolver = Arc::new(FuzzyResolver::new(5, Arc::new(alias::SymlinkAliases)));
    let policy = crate::poll::PollPolicy::fixed(
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(600),
    );
    DownloadWorker::new(
        fetcher,
        resolver.clone(),
        DiskSpaceGate::new(Arc::new(FixedSpace(free_bytes)), 1, policy.clone()),
        CompletionPoller::new(resolver, policy, false),
    )
}
