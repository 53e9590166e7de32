use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poll::{Deadline, PollPolicy};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Settings {
    pub query: QuerySettings,
    pub download: DownloadSettings,
    pub filter: FilterSettings,
    pub resolver: ResolverSettings,
    pub disk: DiskSettings,
    pub completion: CompletionSettings,
    pub s3: S3Settings,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct QuerySettings {
    pub catalog_url: String,
    pub collection: Option<String>,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub orbit: Option<String>,
    pub polarisation: Option<String>,
    pub contains: bool,
    pub limit: usize,
    pub asset_key: Option<String>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            catalog_url: "https://earth-search.aws.element84.com/v1".to_string(),
            collection: Some("sentinel-1-grd".to_string()),
            platform: None,
            product: None,
            orbit: None,
            polarisation: None,
            contains: false,
            limit: 500,
            asset_key: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AliasBackend {
    #[default]
    Symlink,
    Index,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DownloadSettings {
    pub save_dir: PathBuf,
    pub process_num: usize,
    pub admission_interval_secs: u64,
    pub drain_interval_secs: u64,
    pub aliases: AliasBackend,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("sar_data"),
            process_num: 8,
            admission_interval_secs: 60,
            drain_interval_secs: 60,
            aliases: AliasBackend::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub footprint_divisor: f64,
    pub aoi_divisor: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            footprint_divisor: 5.0,
            aoi_divisor: 2.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ResolverSettings {
    pub window_secs: i64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self { window_secs: 5 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DiskSettings {
    pub min_free_gb: f64,
    pub interval_secs: u64,
    pub max_wait_secs: u64,
    pub hard_deadline: bool,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            min_free_gb: 50.0,
            interval_secs: 60,
            max_wait_secs: 12 * 60 * 60,
            hard_deadline: false,
        }
    }
}

impl DiskSettings {
    pub fn min_free_bytes(&self) -> u64 {
        (self.min_free_gb * BYTES_PER_GB) as u64
    }

    pub fn policy(&self) -> PollPolicy {
        let deadline = if self.hard_deadline {
            Deadline::Hard
        } else {
            Deadline::Soft
        };
        PollPolicy::fixed(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.max_wait_secs),
        )
        .with_deadline(deadline)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct CompletionSettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
    /// Treat an exhausted wait budget as a failed download
    pub strict: bool,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_wait_secs: 12 * 60 * 60,
            strict: false,
        }
    }
}

impl CompletionSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::fixed(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.max_wait_secs),
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct S3Settings {
    pub profile: Option<String>,
    pub endpoint: Option<String>,
    pub region: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            profile: None,
            endpoint: None,
            region: "us-east-1".to_string(),
        }
    }
}

/// Commented starting point for a configuration file.
pub fn settings_toml() -> toml::Table {
    toml::toml! {
        [query]
        catalog_url = "https://earth-search.aws.element84.com/v1"
        collection = "sentinel-1-grd"
        // e.g. "sentinel-1a"; leave out to search every platform
        limit = 500
        contains = false

        [download]
        save_dir = "sar_data"
        process_num = 8
        admission_interval_secs = 60
        drain_interval_secs = 60
        // "index" keeps aliases in .aliases.json instead of symlinks
        aliases = "symlink"

        [filter]
        enabled = true
        footprint_divisor = 5.0
        aoi_divisor = 2.0

        [resolver]
        window_secs = 5

        [disk]
        min_free_gb = 50.0
        interval_secs = 60
        max_wait_secs = 43200
        hard_deadline = false

        [completion]
        interval_secs = 60
        max_wait_secs = 43200
        strict = false

        [s3]
        region = "us-east-1"
    }
}

impl Settings {
    pub fn template() -> Result<Self> {
        Ok(settings_toml().try_into()?)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.download.process_num, 8);
        assert_eq!(settings.resolver.window_secs, 5);
        assert_eq!(settings.disk.min_free_bytes(), 50 * 1024 * 1024 * 1024);
        assert_eq!(settings.disk.policy().max_wait, Duration::from_secs(43200));
        assert!(settings.filter.enabled);
        assert!(!settings.completion.strict);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [download]
            process_num = 2
            aliases = "index"

            [disk]
            hard_deadline = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.download.process_num, 2);
        assert_eq!(settings.download.aliases, AliasBackend::Index);
        assert_eq!(settings.download.drain_interval_secs, 60);
        assert_eq!(settings.disk.policy().deadline, Deadline::Hard);
        assert_eq!(settings.query.limit, 500);
    }

    #[test]
    fn test_template_matches_defaults() {
        let template = Settings::template().unwrap();
        let defaults = Settings::default();
        assert_eq!(template.download.save_dir, defaults.download.save_dir);
        assert_eq!(template.disk.max_wait_secs, defaults.disk.max_wait_secs);
        assert_eq!(template.query.collection, defaults.query.collection);
        assert_eq!(template.filter.footprint_divisor, defaults.filter.footprint_divisor);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow-sar.toml");
        let mut settings = Settings::default();
        settings.query.platform = Some("sentinel-1a".to_string());
        settings.write(&path).unwrap();

        let settings = Settings::read(&path).unwrap();
        assert_eq!(settings.query.platform.as_deref(), Some("sentinel-1a"));
    }
}
