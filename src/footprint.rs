//! Drops catalog results whose footprint barely touches the area of interest.

use geo::{Area, BooleanOps, Geometry, MultiPolygon, Relate};
use tracing::info;
use wkt::TryFromWkt;

use crate::catalog::SearchResult;
use crate::error::{FetchError, Result};
use crate::settings::FilterSettings;

/// Parse a POLYGON or MULTIPOLYGON WKT string.
pub fn parse_area(wkt: &str) -> Result<MultiPolygon<f64>> {
    let geometry = Geometry::<f64>::try_from_wkt_str(wkt)
        .map_err(|err| FetchError::Geometry(format!("{err}: {wkt}")))?;
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(polygons) => Ok(polygons),
        _ => Err(FetchError::Geometry(format!("not a polygon: {wkt}"))),
    }
}

#[derive(Debug, Clone)]
pub struct FootprintFilter {
    pub enabled: bool,
    pub footprint_divisor: f64,
    pub aoi_divisor: f64,
    /// Also require the footprint to cover the whole AOI
    pub contains: bool,
}

impl Default for FootprintFilter {
    fn default() -> Self {
        Self::from_settings(&FilterSettings::default(), false)
    }
}

impl FootprintFilter {
    pub fn from_settings(settings: &FilterSettings, contains: bool) -> Self {
        Self {
            enabled: settings.enabled,
            footprint_divisor: settings.footprint_divisor,
            aoi_divisor: settings.aoi_divisor,
            contains,
        }
    }

    /// A result is dropped only when the overlap is small relative to both its
    /// own footprint and the AOI.
    pub fn keep(&self, footprint_area: f64, aoi_area: f64, overlap_area: f64) -> bool {
        !(overlap_area < footprint_area / self.footprint_divisor
            && overlap_area < aoi_area / self.aoi_divisor)
    }

    pub fn filter(&self, results: Vec<SearchResult>, aoi_wkt: &str) -> Result<Vec<SearchResult>> {
        if results.is_empty() || (!self.enabled && !self.contains) {
            return Ok(results);
        }

        let aoi = parse_area(aoi_wkt)?;
        let aoi_area = aoi.unsigned_area();
        let found = results.len();

        let mut kept = Vec::with_capacity(found);
        for result in results {
            let footprint = parse_area(&result.footprint)?;
            if self.contains && !footprint.relate(&aoi).is_contains() {
                continue;
            }
            if self.enabled {
                let overlap = footprint.intersection(&aoi).unsigned_area();
                if !self.keep(footprint.unsigned_area(), aoi_area, overlap) {
                    continue;
                }
            }
            kept.push(result);
        }

        info!(
            found,
            removed = found - kept.len(),
            "Removed records that only cover a small portion of the study area"
        );
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AOI: &str = "POLYGON((0 0,10 0,10 10,0 10,0 0))";

    fn square(x: f64, y: f64, size: f64) -> String {
        format!(
            "POLYGON(({x} {y},{} {y},{} {},{x} {},{x} {y}))",
            x + size,
            x + size,
            y + size,
            y + size
        )
    }

    #[test]
    fn test_keep_thresholds() {
        let filter = FootprintFilter::default();
        // small footprint with a sliver of overlap
        assert!(!filter.keep(10.0, 100.0, 1.0));
        // large footprint overlapping a fifth of itself
        assert!(filter.keep(200.0, 100.0, 60.0));
        // covers half of the AOI
        assert!(filter.keep(1000.0, 100.0, 50.0));
    }

    #[test]
    fn test_nested_footprint_is_kept() {
        let filter = FootprintFilter::default();
        let results = vec![SearchResult::new(&square(4.0, 4.0, 1.0), "https://example.com/a")];
        let kept = filter.filter(results, AOI).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_edge_overlap_is_dropped() {
        let filter = FootprintFilter::default();
        let results = vec![
            // a sliver of a 100 unit footprint inside the AOI
            SearchResult::new(&square(9.0, 9.9, 10.0), "https://example.com/edge"),
            // covers the whole AOI
            SearchResult::new(&square(-5.0, -5.0, 20.0), "https://example.com/cover"),
            SearchResult::new(&square(50.0, 50.0, 1.0), "https://example.com/far"),
        ];
        let kept = filter.filter(results, AOI).unwrap();
        let urls = kept.iter().map(|r| r.url.as_str()).collect::<Vec<_>>();
        assert_eq!(urls, vec!["https://example.com/cover"]);
    }

    #[test]
    fn test_never_grows() {
        let filter = FootprintFilter::default();
        for offset in [0.0, 2.5, 7.5, 9.5, 12.0] {
            let results = vec![
                SearchResult::new(&square(offset, offset, 3.0), "https://example.com/a"),
                SearchResult::new(&square(offset, 0.0, 30.0), "https://example.com/b"),
            ];
            let kept = filter.filter(results.clone(), AOI).unwrap();
            assert!(kept.len() <= results.len());
        }
    }

    #[test]
    fn test_disabled_passes_everything() {
        let filter = FootprintFilter {
            enabled: false,
            ..FootprintFilter::default()
        };
        let results = vec![SearchResult::new("not even wkt", "https://example.com/a")];
        assert_eq!(filter.filter(results.clone(), AOI).unwrap(), results);
    }

    #[test]
    fn test_contains_mode() {
        let filter = FootprintFilter {
            contains: true,
            ..FootprintFilter::default()
        };
        let results = vec![
            SearchResult::new(&square(-1.0, -1.0, 12.0), "https://example.com/cover"),
            SearchResult::new(&square(2.0, 2.0, 6.0), "https://example.com/inside"),
        ];
        let kept = filter.filter(results, AOI).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://example.com/cover");
    }

    #[test]
    fn test_multipolygon_footprint() {
        let area = parse_area("MULTIPOLYGON(((0 0,1 0,1 1,0 1,0 0)),((5 5,7 5,7 7,5 7,5 5)))").unwrap();
        assert_eq!(area.0.len(), 2);
        assert!((area.unsigned_area() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_polygons() {
        assert!(matches!(parse_area("POINT(1 2)"), Err(FetchError::Geometry(_))));
        assert!(matches!(parse_area("garbage"), Err(FetchError::Geometry(_))));
    }
}
