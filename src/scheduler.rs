//! Runs download tasks with a bounded number in flight.
//!
//! Tasks are admitted in url order. Once any task has failed no new task is
//! admitted; the ones already running are left to finish and the first failure
//! is returned after they have drained.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::{FetchError, Result};
use crate::fetch::Fetcher;
use crate::settings::DownloadSettings;
use crate::worker::{DownloadTask, DownloadWorker, TaskOutcome};

type Finished = (String, anyhow::Result<TaskOutcome>);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub admitted: usize,
    pub already_present: usize,
    pub downloaded: usize,
    pub unconfirmed: usize,
}

pub struct DownloadScheduler<F> {
    worker: Arc<DownloadWorker<F>>,
    max_parallel: usize,
    admission_interval: Duration,
    drain_interval: Duration,
}

impl<F: Fetcher> DownloadScheduler<F> {
    pub fn new(worker: DownloadWorker<F>, max_parallel: usize) -> Self {
        Self {
            worker: Arc::new(worker),
            max_parallel,
            admission_interval: Duration::from_secs(60),
            drain_interval: Duration::from_secs(60),
        }
    }

    pub fn from_settings(worker: DownloadWorker<F>, settings: &DownloadSettings) -> Self {
        Self::new(worker, settings.process_num).with_intervals(
            Duration::from_secs(settings.admission_interval_secs),
            Duration::from_secs(settings.drain_interval_secs),
        )
    }

    /// How often progress is logged while waiting for a free slot and while
    /// draining.
    pub fn with_intervals(mut self, admission: Duration, drain: Duration) -> Self {
        self.admission_interval = admission;
        self.drain_interval = drain;
        self
    }

    pub async fn run(&self, urls: &[String], dir: &Path) -> Result<ScheduleReport> {
        if self.max_parallel == 0 {
            return Err(FetchError::InvalidParallelism);
        }

        let mut running: JoinSet<Finished> = JoinSet::new();
        let mut report = ScheduleReport::default();
        let mut failure = None;

        for url in urls {
            while let Some(joined) = running.try_join_next() {
                record(joined, &mut report, &mut failure);
            }

            while failure.is_none() && running.len() >= self.max_parallel {
                info!(
                    running = running.len(),
                    max_parallel = self.max_parallel,
                    "Running the maximum number of downloads in parallel, waiting"
                );
                if let Ok(Some(joined)) = timeout(self.admission_interval, running.join_next()).await {
                    record(joined, &mut report, &mut failure);
                }
            }

            if failure.is_some() {
                warn!(
                    remaining = urls.len() - report.admitted,
                    "A previous download failed, not starting any more"
                );
                break;
            }

            let task = match DownloadTask::new(url, dir) {
                Ok(task) => task,
                Err(err) => {
                    error!(url = %url, error = %err, "Cannot schedule download");
                    failure = Some(err);
                    break;
                }
            };
            let worker = self.worker.clone();
            running.spawn(async move {
                let result = AssertUnwindSafe(worker.run(&task))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("Download worker panicked")));
                (task.url, result)
            });
            report.admitted += 1;
        }

        while !running.is_empty() {
            match timeout(self.drain_interval, running.join_next()).await {
                Ok(Some(joined)) => record(joined, &mut report, &mut failure),
                Ok(None) => break,
                Err(_) => info!(
                    alive = running.len(),
                    "Waiting until all downloads are completed"
                ),
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

fn record(
    joined: std::result::Result<Finished, JoinError>,
    report: &mut ScheduleReport,
    failure: &mut Option<FetchError>,
) {
    let (url, reason) = match joined {
        Ok((_, Ok(outcome))) => {
            match outcome {
                TaskOutcome::AlreadyPresent => report.already_present += 1,
                TaskOutcome::Downloaded => report.downloaded += 1,
                TaskOutcome::Unconfirmed => report.unconfirmed += 1,
            }
            return;
        }
        Ok((url, Err(err))) => (url, format!("{err:#}")),
        Err(err) => ("<unknown>".to_string(), err.to_string()),
    };

    error!(url = %url, reason = %reason, "Download failed");
    if failure.is_none() {
        *failure = Some(FetchError::Transfer { url, reason });
    }
}
