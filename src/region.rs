//! Areas of interest read from a region file.
//!
//! The file holds one POLYGON or MULTIPOLYGON WKT per line. Blank lines and
//! lines starting with `#` are skipped.

use std::fs;
use std::path::Path;

use crate::error::{FetchError, Result};
use crate::footprint::parse_area;

#[derive(Debug, Clone, PartialEq)]
pub struct AoiRegion {
    /// Position among the regions of the file, starting at 0
    pub index: usize,
    pub wkt: String,
}

pub fn load_regions(path: &Path) -> Result<Vec<AoiRegion>> {
    let content = fs::read_to_string(path)?;
    let regions = parse_regions(&content)?;
    if regions.is_empty() {
        return Err(FetchError::NoRegions(path.to_path_buf()));
    }
    Ok(regions)
}

fn parse_regions(content: &str) -> Result<Vec<AoiRegion>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(index, wkt)| {
            parse_area(wkt)?;
            Ok(AoiRegion {
                index,
                wkt: wkt.to_string(),
            })
        })
        .collect()
}
