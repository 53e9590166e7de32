//! Catalog search results and the interface to a remote catalog.

mod stac_api;
pub use stac_api::StacCatalog;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// One catalog hit.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SearchResult {
    /// Footprint of the product as WKT
    pub footprint: String,
    pub url: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    pub fn new(footprint: &str, url: &str) -> Self {
        Self {
            footprint: footprint.to_string(),
            url: url.to_string(),
            metadata: Map::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CatalogQuery {
    pub aoi_wkt: String,
    pub start: NaiveDate,
    pub stop: NaiveDate,
    pub platform: Option<String>,
    pub product: Option<String>,
    pub orbit: Option<String>,
    pub polarisation: Option<String>,
    pub contains: bool,
    pub limit: usize,
}

pub trait Catalog {
    fn search(&self, query: &CatalogQuery) -> impl Future<Output = Result<Vec<SearchResult>>> + Send;
}
