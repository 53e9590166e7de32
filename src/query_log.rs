use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::SearchResult;
use crate::error::Result;

/// Where the results of region `index` out of `total` are logged.
pub fn meta_path(save_dir: &Path, base_name: &str, index: usize, total: usize) -> PathBuf {
    if total == 1 {
        save_dir.join(format!("{base_name}_meta.json"))
    } else {
        save_dir.join(format!("{base_name}_meta_{index}.json"))
    }
}

/// Keys written by the record itself; metadata entries with these names are left out.
const RECORD_KEYS: [&str; 3] = ["index", "url", "footprint"];

#[derive(Serialize)]
struct Record<'a> {
    index: usize,
    url: &'a str,
    footprint: &'a str,
    #[serde(flatten)]
    metadata: Map<String, Value>,
}

/// Write `results` as a pretty JSON array, one record per result in query order.
pub fn save_query_results(results: &[SearchResult], path: &Path) -> Result<()> {
    let records = results
        .iter()
        .enumerate()
        .map(|(index, result)| Record {
            index,
            url: &result.url,
            footprint: &result.footprint,
            metadata: result
                .metadata
                .iter()
                .filter(|(key, _)| !RECORD_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        })
        .collect::<Vec<_>>();

    let content = serde_json::to_string_pretty(&records)?;
    fs::write(path, content)?;
    info!(path = %path.display(), count = results.len(), "Saved query results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_path() {
        let dir = Path::new("sar_data");
        assert_eq!(
            meta_path(dir, "yukon", 0, 1),
            PathBuf::from("sar_data/yukon_meta.json")
        );
        assert_eq!(
            meta_path(dir, "yukon", 2, 3),
            PathBuf::from("sar_data/yukon_meta_2.json")
        );
    }

    #[test]
    fn test_save_query_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yukon_meta.json");

        let mut first = SearchResult::new("POLYGON((0 0,1 0,1 1,0 1,0 0))", "https://example.com/a.E2");
        first
            .metadata
            .insert("platform".to_string(), json!("ERS-2"));
        let second = SearchResult::new("POLYGON((0 0,2 0,2 2,0 2,0 0))", "https://example.com/b.E2");
        save_query_results(&[first, second], &path).unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            saved,
            json!([
                {
                    "index": 0,
                    "url": "https://example.com/a.E2",
                    "footprint": "POLYGON((0 0,1 0,1 1,0 1,0 0))",
                    "platform": "ERS-2"
                },
                {
                    "index": 1,
                    "url": "https://example.com/b.E2",
                    "footprint": "POLYGON((0 0,2 0,2 2,0 2,0 0))"
                }
            ])
        );
    }

    #[test]
    fn test_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty_meta.json");
        save_query_results(&[], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_metadata_cannot_shadow_record_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clash_meta.json");

        let mut result = SearchResult::new("POLYGON((0 0,1 0,1 1,0 1,0 0))", "https://example.com/a.E2");
        result.metadata.insert("url".to_string(), json!("https://elsewhere.org/a.E2"));
        result.metadata.insert("index".to_string(), json!(7));
        result.metadata.insert("orbit".to_string(), json!(49839));
        save_query_results(&[result], &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("\"url\"").count(), 1);
        assert_eq!(content.matches("\"index\"").count(), 1);

        let saved: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(saved[0]["url"], json!("https://example.com/a.E2"));
        assert_eq!(saved[0]["index"], json!(0));
        assert_eq!(saved[0]["orbit"], json!(49839));
    }
}
