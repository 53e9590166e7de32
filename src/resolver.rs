//! Decide whether an expected asset is already on disk.
//!
//! Some archives save a product under a slightly different name than the one
//! the catalog advertises. For example the catalog url names
//! `SAR_IMS_1PNESA20041031_203036_00000015A099_00386_49839_0000.E2` while the
//! saved file is `SAR_IMS_1PNESA20041031_203035_00000018A099_00386_49839_0000.E2`:
//! the acquisition time drifts by a second or so and the acquisition identifier
//! is unrelated. The resolver searches for such near matches and records an
//! alias from the expected name to the real file.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use glob::Pattern;
use tracing::{debug, warn};

use crate::alias::AliasStore;
use crate::error::Result;

const DATETIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const DATE_LEN: usize = 8;
const TIME_LEN: usize = 6;

const DATE_FIELD: usize = 2;
const TIME_FIELD: usize = 3;
const IDENTIFIER_FIELD: usize = 4;

/// The parts of a product file name used for approximate matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyKey {
    fields: Vec<String>,
    /// Product code in front of the date, e.g. `1PNESA`
    prefix: String,
    timestamp: NaiveDateTime,
}

impl FuzzyKey {
    /// `None` for names without `<prefix><yyyymmdd>_<hhmmss>_<identifier>` in
    /// the third to fifth underscore separated fields.
    pub fn parse(file_name: &str) -> Option<Self> {
        let fields = file_name.split('_').map(str::to_string).collect::<Vec<_>>();
        if fields.len() <= IDENTIFIER_FIELD {
            return None;
        }

        let date_field = &fields[DATE_FIELD];
        let split = date_field.len().checked_sub(DATE_LEN)?;
        if !date_field.is_char_boundary(split) {
            return None;
        }
        let (prefix, date) = date_field.split_at(split);
        let time = &fields[TIME_FIELD];
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(date) || time.len() != TIME_LEN || !all_digits(time) {
            return None;
        }

        let timestamp =
            NaiveDateTime::parse_from_str(&format!("{date}_{time}"), DATETIME_FORMAT).ok()?;
        Some(Self {
            prefix: prefix.to_string(),
            fields,
            timestamp,
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Glob pattern for the name shifted by `offset_secs`, with the identifier
    /// field left open.
    pub fn pattern(&self, offset_secs: i64) -> Option<Pattern> {
        let shifted = self
            .timestamp
            .checked_add_signed(TimeDelta::try_seconds(offset_secs)?)?;
        let shifted = shifted.format(DATETIME_FORMAT).to_string();
        let (date, time) = shifted.split_once('_')?;

        let parts = self
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| match idx {
                DATE_FIELD => format!("{}{date}", Pattern::escape(&self.prefix)),
                TIME_FIELD => time.to_string(),
                IDENTIFIER_FIELD => "*".to_string(),
                _ => Pattern::escape(field),
            })
            .collect::<Vec<_>>();
        Pattern::new(&parts.join("_")).ok()
    }
}

/// Offsets from the earliest to the latest second of the window.
fn offsets(window_secs: i64) -> impl Iterator<Item = i64> {
    let window = window_secs.max(0);
    -window..=window
}

pub struct FuzzyResolver {
    window_secs: i64,
    aliases: Arc<dyn AliasStore>,
}

impl FuzzyResolver {
    pub fn new(window_secs: i64, aliases: Arc<dyn AliasStore>) -> Self {
        Self {
            window_secs,
            aliases,
        }
    }

    /// True when `expected` exists in `dir`, either under its own name or as a
    /// near match, in which case an alias for it is created.
    pub fn exists(&self, expected: &str, dir: &Path) -> Result<bool> {
        if self.exists_exactly(expected, dir)? {
            return Ok(true);
        }
        if !dir.is_dir() {
            return Ok(false);
        }
        let Some(key) = FuzzyKey::parse(expected) else {
            debug!(expected, "File name has no acquisition time, skipping fuzzy search");
            return Ok(false);
        };

        for offset in offsets(self.window_secs) {
            let Some(pattern) = key.pattern(offset) else {
                continue;
            };
            let candidates = self.primary_candidates(dir, &pattern, expected)?;
            match candidates.as_slice() {
                [] => {}
                [found] => {
                    warn!(
                        expected,
                        found = %found,
                        "File does not exist, but a file with a similar name exists"
                    );
                    self.aliases.link(dir, expected, found)?;
                    return Ok(true);
                }
                _ => {
                    warn!(
                        expected,
                        candidates = ?candidates,
                        "Several files with a similar name exist, not picking one"
                    );
                }
            }
        }
        Ok(false)
    }

    /// `exists` on the blocking thread pool, for callers on the async runtime.
    pub async fn exists_async(self: &Arc<Self>, expected: &str, dir: &Path) -> Result<bool> {
        let resolver = self.clone();
        let expected = expected.to_string();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || resolver.exists(&expected, &dir))
            .await
            .map_err(io::Error::other)?
    }

    fn exists_exactly(&self, expected: &str, dir: &Path) -> Result<bool> {
        if dir.join(expected).is_file() {
            return Ok(true);
        }
        match self.aliases.target(dir, expected)? {
            Some(target) => Ok(dir.join(target).is_file()),
            None => Ok(false),
        }
    }

    /// Names other than `expected` matching `pattern` that lead to a file on
    /// disk. When there are several,
    /// aliases and the files they point at are left out so that earlier matches
    /// do not count twice.
    fn primary_candidates(
        &self,
        dir: &Path,
        pattern: &Pattern,
        expected: &str,
    ) -> Result<Vec<String>> {
        let mut matched = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if pattern.matches(&name) {
                matched.insert(name);
            }
        }
        for alias in self.aliases.aliases(dir)? {
            if pattern.matches(&alias) {
                matched.insert(alias);
            }
        }
        matched.remove(expected);

        // an alias whose file is gone does not count
        let mut names = BTreeSet::new();
        for name in matched {
            if dir.join(self.aliases.resolve(dir, &name)?).is_file() {
                names.insert(name);
            }
        }

        if names.len() > 1 {
            let mut dropped = HashSet::new();
            for name in names.iter() {
                if let Some(target) = self.aliases.target(dir, name)? {
                    dropped.insert(name.clone());
                    dropped.insert(target);
                }
            }
            names.retain(|name| !dropped.contains(name));
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{IndexAliases, SymlinkAliases};

    const EXPECTED: &str = "SAR_IMS_1PNESA20041031_203036_00000015A099_00386_49839_0000.E2";
    const ACTUAL: &str = "SAR_IMS_1PNESA20041031_203035_00000018A099_00386_49839_0000.E2";

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    fn symlinks(dir: &Path) -> Vec<String> {
        SymlinkAliases.aliases(dir).unwrap()
    }

    fn resolver() -> FuzzyResolver {
        FuzzyResolver::new(5, Arc::new(SymlinkAliases))
    }

    #[test]
    fn test_parse_key() {
        let key = FuzzyKey::parse(EXPECTED).unwrap();
        assert_eq!(key.prefix, "1PNESA");
        assert_eq!(
            key.timestamp(),
            NaiveDateTime::parse_from_str("20041031_203036", DATETIME_FORMAT).unwrap()
        );
        assert!(FuzzyKey::parse("S1A_IW_GRDH.zip").is_none());
        assert!(FuzzyKey::parse("SAR_IMS_1PNESA2004_203036_X_0.E2").is_none());
        assert!(FuzzyKey::parse("SAR_IMS_1PNESA20041031_2030_X_0.E2").is_none());
        assert!(FuzzyKey::parse("SAR_IMS_1PNESA20041331_203036_X_0.E2").is_none());
    }

    #[test]
    fn test_pattern_shifts_time_and_opens_identifier() {
        let key = FuzzyKey::parse(EXPECTED).unwrap();
        let pattern = key.pattern(-1).unwrap();
        assert_eq!(
            pattern.as_str(),
            "SAR_IMS_1PNESA20041031_203035_*_00386_49839_0000.E2"
        );
        assert!(pattern.matches(ACTUAL));
    }

    #[test]
    fn test_pattern_crosses_midnight() {
        let key = FuzzyKey::parse("ASA_IMS_1PNESA20041031_235958_000000152036_00113_16199_0000.N1")
            .unwrap();
        assert_eq!(
            key.pattern(3).unwrap().as_str(),
            "ASA_IMS_1PNESA20041101_000001_*_00113_16199_0000.N1"
        );
    }

    #[test]
    fn test_offsets_earliest_first() {
        assert_eq!(offsets(2).collect::<Vec<_>>(), vec![-2, -1, 0, 1, 2]);
        assert_eq!(offsets(0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(offsets(-3).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_earliest_unique_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let earlier = "SAR_IMS_1PNESA20041031_203032_00000011A099_00386_49839_0000.E2";
        touch(dir.path(), earlier);
        touch(dir.path(), ACTUAL);

        assert!(resolver().exists(EXPECTED, dir.path()).unwrap());
        assert_eq!(
            SymlinkAliases.target(dir.path(), EXPECTED).unwrap().as_deref(),
            Some(earlier)
        );
    }

    #[test]
    fn test_exact_match_skips_fuzzy_search() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), EXPECTED);
        touch(dir.path(), ACTUAL);
        assert!(resolver().exists(EXPECTED, dir.path()).unwrap());
        assert!(symlinks(dir.path()).is_empty());
    }

    #[test]
    fn test_near_match_creates_one_alias() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ACTUAL);
        let resolver = resolver();

        assert!(resolver.exists(EXPECTED, dir.path()).unwrap());
        assert_eq!(symlinks(dir.path()), vec![EXPECTED.to_string()]);
        assert_eq!(
            SymlinkAliases.target(dir.path(), EXPECTED).unwrap().as_deref(),
            Some(ACTUAL)
        );

        assert!(resolver.exists(EXPECTED, dir.path()).unwrap());
        assert_eq!(symlinks(dir.path()).len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "SAR_IMS_1PNESA20041031_203050_00000018A099_00386_49839_0000.E2",
        );
        assert!(!resolver().exists(EXPECTED, dir.path()).unwrap());
        assert!(symlinks(dir.path()).is_empty());
    }

    #[test]
    fn test_ambiguous_match_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ACTUAL);
        touch(
            dir.path(),
            "SAR_IMS_1PNESA20041031_203035_00000019A099_00386_49839_0000.E2",
        );
        assert!(!resolver().exists(EXPECTED, dir.path()).unwrap());
        assert!(symlinks(dir.path()).is_empty());
    }

    #[test]
    fn test_alias_and_target_are_not_counted_twice() {
        let dir = tempfile::tempdir().unwrap();
        // same acquisition time, only the identifier differs
        let expected = "SAR_IMS_1PNESA20041031_203035_00000015A099_00386_49839_0000.E2";
        touch(dir.path(), ACTUAL);
        let resolver = resolver();
        assert!(resolver.exists(expected, dir.path()).unwrap());
        assert!(resolver.exists(expected, dir.path()).unwrap());
        assert_eq!(symlinks(dir.path()).len(), 1);

        // the alias and its target both match this key and are set aside
        let other = "SAR_IMS_1PNESA20041031_203035_00000077A099_00386_49839_0000.E2";
        assert!(!resolver.exists(other, dir.path()).unwrap());
        assert_eq!(symlinks(dir.path()).len(), 1);
    }

    #[test]
    fn test_single_alias_candidate_links_to_real_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ACTUAL);
        let resolver = resolver();
        assert!(resolver.exists(EXPECTED, dir.path()).unwrap());

        // five seconds later only the alias (203036) is within the window
        let other = "SAR_IMS_1PNESA20041031_203041_00000099A099_00386_49839_0000.E2";
        assert!(resolver.exists(other, dir.path()).unwrap());
        assert_eq!(
            SymlinkAliases.target(dir.path(), other).unwrap().as_deref(),
            Some(ACTUAL)
        );
    }

    #[test]
    fn test_dangling_alias_is_not_a_match() {
        for aliases in [
            Arc::new(SymlinkAliases) as Arc<dyn AliasStore>,
            Arc::new(IndexAliases::default()),
        ] {
            let dir = tempfile::tempdir().unwrap();
            touch(dir.path(), ACTUAL);
            let resolver = FuzzyResolver::new(5, aliases);
            assert!(resolver.exists(EXPECTED, dir.path()).unwrap());

            fs::remove_file(dir.path().join(ACTUAL)).unwrap();
            let other = "SAR_IMS_1PNESA20041031_203037_00000099A099_00386_49839_0000.E2";
            assert!(!resolver.exists(other, dir.path()).unwrap());
            assert!(!resolver.exists(EXPECTED, dir.path()).unwrap());
        }
    }

    #[tokio::test]
    async fn test_exists_async_runs_the_same_check() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ACTUAL);
        let resolver = Arc::new(resolver());

        assert!(resolver.exists_async(EXPECTED, dir.path()).await.unwrap());
        assert_eq!(symlinks(dir.path()), vec![EXPECTED.to_string()]);
        let missing = "SAR_IMS_1PNESA20041031_213036_00000015A099_00386_49839_0000.E2";
        assert!(!resolver.exists_async(missing, dir.path()).await.unwrap());
    }

    #[test]
    fn test_partial_download_is_not_a_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &format!("{ACTUAL}.partial"));
        assert!(!resolver().exists(EXPECTED, dir.path()).unwrap());
    }

    #[test]
    fn test_index_backend() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ACTUAL);
        let resolver = FuzzyResolver::new(5, Arc::new(IndexAliases::default()));

        assert!(resolver.exists(EXPECTED, dir.path()).unwrap());
        assert!(symlinks(dir.path()).is_empty());
        assert!(dir.path().join(crate::alias::INDEX_FILE_NAME).is_file());
        assert!(resolver.exists(EXPECTED, dir.path()).unwrap());
    }

    #[test]
    fn test_missing_directory() {
        assert!(!resolver().exists(EXPECTED, Path::new("/nonexistent/slow-sar")).unwrap());
    }
}
