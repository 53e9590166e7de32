mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use slow_sar::catalog::StacCatalog;
use slow_sar::disk::SystemDisks;
use slow_sar::fetch::{AutoFetcher, HttpFetcher, S3Fetcher};
use slow_sar::session::Session;
use slow_sar::settings::Settings;
use slow_sar::worker::DownloadWorker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.dump_config {
        Settings::template()?.write(path)?;
        info!(path = %path.display(), "Wrote settings template");
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::read(path)
            .with_context(|| format!("Cannot read settings from {}", path.display()))?,
        None => Settings::default(),
    };
    cli.apply(&mut settings);

    let Some(region_file) = &cli.region_file else {
        anyhow::bail!("No region file given");
    };

    let catalog = StacCatalog::new(
        &settings.query.catalog_url,
        settings.query.collection.clone(),
        settings.query.asset_key.clone(),
    );
    let s3 = (settings.s3.profile.is_some() || settings.s3.endpoint.is_some())
        .then(|| S3Fetcher::new(settings.s3.clone()));
    let fetcher = AutoFetcher::new(HttpFetcher::new()?, s3);
    let worker = DownloadWorker::from_settings(fetcher, Arc::new(SystemDisks), &settings);

    let session = Session::new(catalog, worker, &settings);
    let reports = session
        .run(region_file, cli.start_date, cli.end_date)
        .await?;

    let downloaded: usize = reports.iter().map(|report| report.downloaded).sum();
    let already_present: usize = reports.iter().map(|report| report.already_present).sum();
    info!(regions = reports.len(), downloaded, already_present, "All done");
    Ok(())
}
