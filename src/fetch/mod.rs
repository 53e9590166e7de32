//! Mechanisms that put a remote file into a local directory.
//!
//! A fetcher only has to leave the finished file in the directory under the
//! name its url ends with; the scheduler decides when it runs and how many run
//! at once, and the completion poller decides when the file is there.

pub mod http;
pub mod s3;

pub use http::HttpFetcher;
pub use s3::{S3Fetcher, S3Object};

use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::FetchError;

pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str, dir: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Last path segment of `url`, the name a fetched file is expected under.
pub fn file_name_from_url(url: &str) -> std::result::Result<String, FetchError> {
    Url::parse(url)
        .ok()
        .and_then(|url| {
            url.path_segments()?
                .last()
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| FetchError::InvalidFileName(url.to_string()))
}

/// Path of the in-progress download of `dst`.
pub fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Plain http(s) urls go through `HttpFetcher`, S3 urls through `S3Fetcher`
/// when one is configured.
pub struct AutoFetcher {
    http: HttpFetcher,
    s3: Option<S3Fetcher>,
}

impl AutoFetcher {
    pub fn new(http: HttpFetcher, s3: Option<S3Fetcher>) -> Self {
        Self { http, s3 }
    }
}

impl Fetcher for AutoFetcher {
    async fn fetch(&self, url: &str, dir: &Path) -> Result<()> {
        match (&self.s3, S3Object::from_url(url)) {
            (Some(s3), Ok(object)) => s3.fetch_object(&object, dir).await,
            _ => self.http.fetch(url, dir).await,
        }
    }
}
