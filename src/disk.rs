use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::Disks;
use tracing::warn;

use crate::error::Result;
use crate::poll::PollPolicy;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub trait SpaceProbe: Send + Sync {
    fn free_bytes(&self, dir: &Path) -> Result<u64>;
}

/// Free space of the mounted disk holding a directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDisks;

impl SpaceProbe for SystemDisks {
    fn free_bytes(&self, dir: &Path) -> Result<u64> {
        let dir = dir.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| dir.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No mounted disk holds {}", dir.display()),
                )
                .into()
            })
    }
}

fn as_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// Holds back new downloads while the download volume is short on space.
pub struct DiskSpaceGate {
    probe: Arc<dyn SpaceProbe>,
    min_free_bytes: u64,
    policy: PollPolicy,
}

impl DiskSpaceGate {
    pub fn new(probe: Arc<dyn SpaceProbe>, min_free_bytes: u64, policy: PollPolicy) -> Self {
        Self {
            probe,
            min_free_bytes,
            policy,
        }
    }

    /// Returns false when the wait budget ran out before space freed up; the
    /// caller proceeds regardless unless the policy has a hard deadline.
    pub async fn await_space(&self, dir: &Path) -> Result<bool> {
        let outcome = self
            .policy
            .wait_until("free disk space", move |waited| self.has_space(dir, waited))
            .await?;
        if !outcome.is_ready() {
            warn!(
                waited_secs = outcome.waited().as_secs(),
                "Still short on disk space, starting the download anyway"
            );
        }
        Ok(outcome.is_ready())
    }

    async fn has_space(&self, dir: &Path, waited: Duration) -> Result<bool> {
        let free = self.probe.free_bytes(dir)?;
        if free >= self.min_free_bytes {
            return Ok(true);
        }
        warn!(
            free_gb = as_gb(free),
            min_gb = as_gb(self.min_free_bytes),
            waited_secs = waited.as_secs(),
            "Free disk space is below the threshold, waiting"
        );
        Ok(false)
    }
}
