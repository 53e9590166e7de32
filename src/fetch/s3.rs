//! Fetching from S3 buckets, anonymously or with a named profile.
use anyhow::{anyhow, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpRequest;
use regex::Regex;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{partial_path, Fetcher};
use crate::error::MapError;
use crate::settings::S3Settings;

#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Accepts `s3://bucket/key` and virtual-hosted
    /// `https://bucket.s3.region.amazonaws.com/key` urls.
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or(anyhow!("No bucket and key in: {}", url))?;
            return Ok(Self {
                region: None,
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let re = Regex::new(
            r"https:\/\/(?<bucket>[\d\w-]+)\.s3\.(?<region>[\d\w-]+)\.amazonaws.com\/(?<key>.+)",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;

        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: Some(region.to_string()),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn file_name(&self) -> Result<&str> {
        self.key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or(anyhow!("Object key has no file name: {}", self.key))
    }
}

pub struct S3Fetcher {
    settings: S3Settings,
}

impl S3Fetcher {
    pub fn new(settings: S3Settings) -> Self {
        Self { settings }
    }

    /// Client for `region`, using the configured profile or no credentials at all.
    async fn client(&self, region: Option<&str>) -> Client {
        let region = region.unwrap_or(&self.settings.region).to_string();
        let loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));
        let base_config = match &self.settings.profile {
            Some(profile) => loader.profile_name(profile).load().await,
            None => loader.no_credentials().load().await,
        };

        let mut s3_config = aws_sdk_s3::config::Builder::from(&base_config)
            .region(Region::new(region))
            .force_path_style(true);
        if let Some(endpoint) = &self.settings.endpoint {
            s3_config = s3_config.endpoint_url(endpoint);
        }
        Client::from_conf(s3_config.build())
    }

    async fn head_object(&self, client: &Client, object: &S3Object) -> Result<HeadObjectOutput> {
        let head = client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await?;
        Ok(head)
    }

    async fn get_object_range(
        &self,
        client: &Client,
        object: &S3Object,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput> {
        let range = format!("bytes={}-{}", start_byte, end_byte);
        let request = client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .range(range);
        let output = if self.settings.endpoint.is_some() {
            request
                .customize()
                .map_request(strip_x_id_get_object_param_from_uri)
                .send()
                .await?
        } else {
            request.send().await?
        };
        Ok(output)
    }

    pub async fn fetch_object(&self, object: &S3Object, dir: &Path) -> Result<()> {
        let dst = dir.join(object.file_name()?);
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

        let client = self.client(object.region.as_deref()).await;
        let head_object = self.head_object(&client, object).await?;
        let total_size = head_object
            .content_length()
            .ok_or(anyhow!("Error reading size of remote object"))? as u64;

        let progress = (byte_count as f64 / total_size as f64) * 100.;
        if progress > 0.0 {
            info!(key = %object.key, "Resuming download from {:.2}% completion", progress);
        }

        if byte_count < total_size {
            let mut response = self
                .get_object_range(&client, object, byte_count, total_size - 1)
                .await?;

            while let Some(bytes) = response.body.try_next().await? {
                partial_file.write_all(&bytes).await?;
                byte_count += bytes.len() as u64;
            }
            partial_file.flush().await?;
        }

        info!(key = %object.key, byte_count, "Download complete");
        fs::rename(partial, dst).await?;
        Ok(())
    }
}

impl Fetcher for S3Fetcher {
    async fn fetch(&self, url: &str, dir: &Path) -> Result<()> {
        let object = S3Object::from_url(url)?;
        self.fetch_object(&object, dir).await
    }
}

/// Drops `x-id=GetObject` from the request uri, which some S3-compatible
/// endpoints refuse.
fn strip_x_id_get_object_param_from_uri(
    req: HttpRequest,
) -> std::result::Result<HttpRequest, MapError> {
    let mut r = req.try_clone().ok_or(MapError::Clone)?;
    let _ = r.set_uri(r.uri().replace("x-id=GetObject", ""));
    Ok(r)
}
