use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use slow_sar::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "slow-sar")]
#[command(about = "Search a SAR catalog for areas of interest and download the matching scenes", long_about = None)]
pub struct Cli {
    /// File with one POLYGON or MULTIPOLYGON WKT per line
    #[arg(required_unless_present = "dump_config")]
    pub region_file: Option<PathBuf>,

    /// TOML settings; built-in defaults are used without it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the settings template to this path and exit
    #[arg(long)]
    pub dump_config: Option<PathBuf>,

    #[arg(short = 'd', long)]
    pub save_dir: Option<PathBuf>,

    #[arg(short, long, default_value = "2018-04-30")]
    pub start_date: NaiveDate,

    #[arg(short, long, default_value = "2018-06-30")]
    pub end_date: NaiveDate,

    #[arg(long)]
    pub platform: Option<String>,

    #[arg(long)]
    pub product: Option<String>,

    /// Orbit direction, ASCENDING or DESCENDING
    #[arg(long)]
    pub orbit: Option<String>,

    #[arg(long)]
    pub polarisation: Option<String>,

    /// Maximum number of downloads running at once
    #[arg(long)]
    pub process_num: Option<usize>,

    /// Keep results that only cover a small part of the area of interest
    #[arg(long)]
    pub keep_small_overlap: bool,

    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Fail a download whose file never shows up instead of moving on
    #[arg(long)]
    pub strict_completion: bool,
}

impl Cli {
    /// Flags given on the command line win over the settings file.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(save_dir) = &self.save_dir {
            settings.download.save_dir = save_dir.clone();
        }
        if let Some(process_num) = self.process_num {
            settings.download.process_num = process_num;
        }
        if let Some(catalog_url) = &self.catalog_url {
            settings.query.catalog_url = catalog_url.clone();
        }
        let query = &mut settings.query;
        for (flag, value) in [
            (&self.platform, &mut query.platform),
            (&self.product, &mut query.product),
            (&self.orbit, &mut query.orbit),
            (&self.polarisation, &mut query.polarisation),
        ] {
            if flag.is_some() {
                *value = flag.clone();
            }
        }
        if self.keep_small_overlap {
            settings.filter.enabled = false;
        }
        if self.strict_completion {
            settings.completion.strict = true;
        }
    }
}
