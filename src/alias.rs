//! Expected-name → real-name aliases inside a download directory.
//!
//! An alias always points at a real file, never at another alias, so a lookup
//! resolves in one hop.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Result;
use crate::settings::AliasBackend;

pub const INDEX_FILE_NAME: &str = ".aliases.json";

pub trait AliasStore: Send + Sync {
    /// The real name `name` points at, or `None` when it is not an alias.
    fn target(&self, dir: &Path, name: &str) -> Result<Option<String>>;

    /// Names of every alias in `dir`.
    fn aliases(&self, dir: &Path) -> Result<Vec<String>>;

    /// Record `alias` → `target`. An alias target is followed first.
    fn link(&self, dir: &Path, alias: &str, target: &str) -> Result<()>;

    fn resolve(&self, dir: &Path, name: &str) -> Result<String> {
        Ok(self.target(dir, name)?.unwrap_or_else(|| name.to_string()))
    }
}

pub fn store_for(backend: AliasBackend) -> Arc<dyn AliasStore> {
    match backend {
        AliasBackend::Symlink => Arc::new(SymlinkAliases),
        AliasBackend::Index => Arc::new(IndexAliases::default()),
    }
}

/// Aliases as relative symbolic links next to the real file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkAliases;

impl AliasStore for SymlinkAliases {
    fn target(&self, dir: &Path, name: &str) -> Result<Option<String>> {
        let path = dir.join(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&path)?;
                Ok(target
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()))
            }
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn aliases(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn link(&self, dir: &Path, alias: &str, target: &str) -> Result<()> {
        let target = self.resolve(dir, target)?;
        match symlink(&target, &dir.join(alias)) {
            Ok(()) => Ok(()),
            // another worker got there first
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if self.target(dir, alias)?.as_deref() == Some(target.as_str()) {
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Aliases kept in a JSON index file in the download directory.
#[derive(Debug, Default)]
pub struct IndexAliases {
    lock: Mutex<()>,
}

impl IndexAliases {
    fn load(dir: &Path) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(dir.join(INDEX_FILE_NAME)) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(dir: &Path, index: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(index)?;
        fs::write(dir.join(INDEX_FILE_NAME), content)?;
        Ok(())
    }
}

impl AliasStore for IndexAliases {
    fn target(&self, dir: &Path, name: &str) -> Result<Option<String>> {
        Ok(Self::load(dir)?.remove(name))
    }

    fn aliases(&self, dir: &Path) -> Result<Vec<String>> {
        Ok(Self::load(dir)?.into_keys().collect())
    }

    fn link(&self, dir: &Path, alias: &str, target: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut index = Self::load(dir)?;
        let target = index.get(target).cloned().unwrap_or_else(|| target.to_string());
        debug!(alias, target = %target, "Recording alias");
        index.insert(alias.to_string(), target);
        Self::save(dir, &index)
    }
}
