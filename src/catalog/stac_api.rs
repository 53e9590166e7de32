use anyhow::{Context, Result};
use geo::MultiPolygon;
use serde_json::{json, Map, Value};
use stac::{Item, ItemCollection};
use tracing::{debug, warn};

use super::{Catalog, CatalogQuery, SearchResult};
use crate::footprint::parse_area;

/// A STAC API (`/search` endpoint) used as the imagery catalog.
pub struct StacCatalog {
    client: reqwest::Client,
    search_url: String,
    collection: Option<String>,
    asset_key: Option<String>,
}

impl StacCatalog {
    pub fn new(catalog_url: &str, collection: Option<String>, asset_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            search_url: format!("{}/search", catalog_url.trim_end_matches('/')),
            collection,
            asset_key,
        }
    }

    fn search_body(&self, query: &CatalogQuery) -> Result<Value> {
        let aoi = parse_area(&query.aoi_wkt)?;

        let mut filters = Map::new();
        if let Some(platform) = &query.platform {
            filters.insert("platform".to_string(), json!({ "eq": platform }));
        }
        if let Some(product) = &query.product {
            filters.insert("sar:product_type".to_string(), json!({ "eq": product }));
        }
        if let Some(orbit) = &query.orbit {
            filters.insert(
                "sat:orbit_state".to_string(),
                json!({ "eq": orbit.to_lowercase() }),
            );
        }

        let mut body = json!({
            "intersects": to_geojson(&aoi),
            "datetime": format!("{}T00:00:00Z/{}T23:59:59Z", query.start, query.stop),
            "limit": query.limit,
        });
        if let Some(collection) = &self.collection {
            body["collections"] = json!([collection]);
        }
        if !filters.is_empty() {
            body["query"] = Value::Object(filters);
        }
        Ok(body)
    }

    fn asset_href<'a>(&self, item: &'a Item) -> Option<&'a str> {
        let asset = match &self.asset_key {
            Some(key) => item.assets.get(key.as_str())?,
            None => item
                .assets
                .values()
                .find(|asset| asset.roles.iter().any(|role| role == "data"))?,
        };
        Some(asset.href.as_str())
    }

    fn to_search_result(&self, item: &Item, polarisation: Option<&str>) -> Result<Option<SearchResult>> {
        let Some(geometry) = &item.geometry else {
            warn!(id = %item.id, "Item has no geometry, skipping");
            return Ok(None);
        };
        let Some(footprint) = geojson_to_wkt(&serde_json::to_value(geometry)?) else {
            warn!(id = %item.id, "Item geometry is not a polygon, skipping");
            return Ok(None);
        };
        let Some(url) = self.asset_href(item) else {
            warn!(id = %item.id, "Item has no downloadable asset, skipping");
            return Ok(None);
        };

        let mut metadata = match serde_json::to_value(&item.properties)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(wanted) = polarisation {
            if !has_polarisation(&metadata, wanted) {
                debug!(id = %item.id, wanted, "Polarisation not available, skipping");
                return Ok(None);
            }
        }
        metadata.insert("id".to_string(), Value::String(item.id.clone()));

        Ok(Some(SearchResult {
            footprint,
            url: url.to_string(),
            metadata,
        }))
    }
}

impl Catalog for StacCatalog {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<SearchResult>> {
        let body = self.search_body(query)?;
        debug!(url = %self.search_url, %body, "Searching catalog");

        let item_collection: ItemCollection = self
            .client
            .post(&self.search_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Catalog search at {} failed", self.search_url))?
            .json()
            .await?;

        let mut results = Vec::new();
        for item in item_collection.items.iter() {
            if let Some(result) = self.to_search_result(item, query.polarisation.as_deref())? {
                results.push(result);
            }
        }
        Ok(results)
    }
}

fn has_polarisation(properties: &Map<String, Value>, wanted: &str) -> bool {
    properties
        .get("sar:polarizations")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .any(|value| value.eq_ignore_ascii_case(wanted))
        })
        .unwrap_or(false)
}

fn to_geojson(area: &MultiPolygon<f64>) -> Value {
    let polygons = area
        .0
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.coords().map(|c| json!([c.x, c.y])).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    match polygons.as_slice() {
        [single] => json!({ "type": "Polygon", "coordinates": single }),
        _ => json!({ "type": "MultiPolygon", "coordinates": polygons }),
    }
}

fn geojson_to_wkt(geometry: &Value) -> Option<String> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(format!("POLYGON{}", polygon_text(coordinates)?)),
        "MultiPolygon" => {
            let polygons = coordinates
                .as_array()?
                .iter()
                .map(polygon_text)
                .collect::<Option<Vec<_>>>()?;
            Some(format!("MULTIPOLYGON({})", polygons.join(",")))
        }
        _ => None,
    }
}

fn polygon_text(rings: &Value) -> Option<String> {
    let rings = rings
        .as_array()?
        .iter()
        .map(|ring| {
            let points = ring
                .as_array()?
                .iter()
                .map(|point| {
                    let point = point.as_array()?;
                    Some(format!("{} {}", point.first()?.as_f64()?, point.get(1)?.as_f64()?))
                })
                .collect::<Option<Vec<_>>>()?;
            Some(format!("({})", points.join(",")))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(format!("({})", rings.join(",")))
}
