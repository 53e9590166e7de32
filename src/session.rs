//! Search, filter, log and download, one area of interest at a time.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::{Catalog, CatalogQuery};
use crate::fetch::Fetcher;
use crate::footprint::FootprintFilter;
use crate::query_log::{meta_path, save_query_results};
use crate::region::{load_regions, AoiRegion};
use crate::scheduler::{DownloadScheduler, ScheduleReport};
use crate::settings::{QuerySettings, Settings};
use crate::worker::DownloadWorker;

pub struct Session<C, F> {
    catalog: C,
    scheduler: DownloadScheduler<F>,
    filter: FootprintFilter,
    query: QuerySettings,
    save_dir: PathBuf,
}

impl<C: Catalog, F: Fetcher> Session<C, F> {
    pub fn new(catalog: C, worker: DownloadWorker<F>, settings: &Settings) -> Self {
        Self {
            catalog,
            scheduler: DownloadScheduler::from_settings(worker, &settings.download),
            filter: FootprintFilter::from_settings(&settings.filter, settings.query.contains),
            query: settings.query.clone(),
            save_dir: settings.download.save_dir.clone(),
        }
    }

    /// Process every region of `region_file` in order. The first failed
    /// download ends the session once the downloads of its region have drained.
    pub async fn run(
        &self,
        region_file: &Path,
        start: NaiveDate,
        stop: NaiveDate,
    ) -> Result<Vec<ScheduleReport>> {
        fs::create_dir_all(&self.save_dir)
            .with_context(|| format!("Cannot create {}", self.save_dir.display()))?;
        let regions = load_regions(region_file)?;
        let base_name = region_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "regions".to_string());

        let mut reports = Vec::with_capacity(regions.len());
        for region in &regions {
            let log_path = meta_path(&self.save_dir, &base_name, region.index, regions.len());
            let report = self.run_region(region, start, stop, &log_path).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_region(
        &self,
        region: &AoiRegion,
        start: NaiveDate,
        stop: NaiveDate,
        log_path: &Path,
    ) -> Result<ScheduleReport> {
        info!(
            index = region.index,
            aoi = %region.wkt,
            %start,
            %stop,
            platform = ?self.query.platform,
            product = ?self.query.product,
            orbit = ?self.query.orbit,
            "Searching"
        );
        let query = CatalogQuery {
            aoi_wkt: region.wkt.clone(),
            start,
            stop,
            platform: self.query.platform.clone(),
            product: self.query.product.clone(),
            orbit: self.query.orbit.clone(),
            polarisation: self.query.polarisation.clone(),
            contains: self.query.contains,
            limit: self.query.limit,
        };
        let results = self
            .catalog
            .search(&query)
            .await
            .with_context(|| format!("Catalog search failed for region {}", region.index))?;
        let results = self.filter.filter(results, &region.wkt)?;
        info!(count = results.len(), "Found results, downloading");

        save_query_results(&results, log_path)?;

        let urls = results
            .into_iter()
            .map(|result| result.url)
            .collect::<Vec<_>>();
        let report = self.scheduler.run(&urls, &self.save_dir).await?;
        info!(
            index = region.index,
            downloaded = report.downloaded,
            already_present = report.already_present,
            unconfirmed = report.unconfirmed,
            "Region done"
        );
        Ok(report)
    }
}
