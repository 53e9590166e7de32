use anyhow::{bail, Result};
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{file_name_from_url, partial_path, Fetcher};

/// Streams a url into `<name>.partial`, resuming from whatever is already
/// there, and renames it once the body has been read.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("slow-sar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dir: &Path) -> Result<()> {
        let dst = dir.join(file_name_from_url(url)?);
        if fs::try_exists(&dst).await? {
            info!(path = %dst.display(), "Output file already exists");
            return Ok(());
        }
        fs::create_dir_all(dir).await?;

        let partial = partial_path(&dst);
        let mut partial_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&partial)
            .await?;
        let mut byte_count = partial_file.metadata().await?.len();

        let mut request = self.client.get(url);
        if byte_count > 0 {
            request = request.header(RANGE, format!("bytes={}-", byte_count));
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && byte_count > 0 {
            debug!(url, byte_count, "Nothing left to fetch");
        } else if !status.is_success() {
            bail!("HTTP {} while fetching {}", status, url);
        } else {
            if status == StatusCode::PARTIAL_CONTENT {
                info!(url, byte_count, "Resuming download");
            } else if byte_count > 0 {
                // the server ignored the range, start over
                partial_file.set_len(0).await?;
                byte_count = 0;
            }

            let mut body = response.bytes_stream();
            while let Some(bytes) = body.next().await {
                let bytes = bytes?;
                partial_file.write_all(&bytes).await?;
                byte_count += bytes.len() as u64;
            }
            partial_file.flush().await?;
        }

        info!(url, byte_count, "Download complete");
        fs::rename(partial, dst).await?;
        Ok(())
    }
}
