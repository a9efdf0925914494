//! Process-wide cache of open bundle readers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::error::BundleError;
use super::format::{Entry, canonical_path};
use super::reader::BundleReader;
use super::stream::BundleStream;

/// Scheme prefix accepted in front of bundle paths.
pub const BUNDLE_SCHEME: &str = "xbt://";

/// File extension that marks the bundle component of a path.
pub const BUNDLE_EXTENSION: &str = ".xbt";

/// Split `skin.xbt/ui/button.png` into the bundle file and the entry inside it.
///
/// The bundle is the shortest prefix whose last component ends in `.xbt`
/// (any case). Without such a component the whole path is the bundle.
pub fn split_bundle_path(path: &str) -> (PathBuf, Option<String>) {
    let path = path.strip_prefix(BUNDLE_SCHEME).unwrap_or(path);

    let mut end = 0;
    for component in path.split('/') {
        end += component.len();
        if component.to_ascii_lowercase().ends_with(BUNDLE_EXTENSION) {
            let entry = path[end..].trim_start_matches('/');
            let entry = (!entry.is_empty()).then(|| canonical_path(entry));
            return (PathBuf::from(&path[..end]), entry);
        }
        end += 1;
    }
    (PathBuf::from(path), None)
}

/// Keyed cache of open [`BundleReader`]s.
///
/// Readers are shared: the cache hands out `Arc`s, and evicting a bundle
/// only drops the cache's reference. A reader handed out earlier stays
/// usable until its last holder drops it.
///
/// Every lookup compares the bundle's on-disk modification time with the
/// time captured when it was opened and reopens stale bundles.
#[derive(Debug, Default)]
pub struct BundleManager {
    readers: Mutex<HashMap<PathBuf, Arc<BundleReader>>>,
}

impl BundleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide manager, created on first use.
    pub fn global() -> &'static BundleManager {
        static GLOBAL: OnceLock<BundleManager> = OnceLock::new();
        GLOBAL.get_or_init(BundleManager::new)
    }

    /// Return the cached reader for the bundle named by `path`, opening or
    /// reopening it as needed.
    pub fn reader(&self, path: &str) -> Result<Arc<BundleReader>, BundleError> {
        let (bundle, _) = split_bundle_path(path);
        let mut readers = self.readers.lock();

        if let Some(reader) = readers.get(&bundle) {
            let modified = fs::metadata(&bundle).and_then(|m| m.modified());
            match modified {
                Ok(time) if time == reader.last_modified() => return Ok(reader.clone()),
                _ => {
                    log::debug!("Bundle {} changed on disk, reopening", bundle.display());
                    readers.remove(&bundle);
                }
            }
        }

        let reader = Arc::new(BundleReader::open(&bundle)?);
        readers.insert(bundle, reader.clone());
        Ok(reader)
    }

    /// True if the bundle opens and has at least one entry.
    pub fn has_entries(&self, path: &str) -> bool {
        self.reader(path)
            .map(|r| !r.entries().is_empty())
            .unwrap_or(false)
    }

    /// All entries of the bundle named by `path`.
    pub fn entries(&self, path: &str) -> Result<Vec<Entry>, BundleError> {
        Ok(self.reader(path)?.entries().to_vec())
    }

    /// The entry addressed by `bundle.xbt/entry/path`.
    pub fn entry(&self, path: &str) -> Result<Entry, BundleError> {
        let reader = self.reader(path)?;
        entry_in(&reader, path)
    }

    /// Open a stream over the entry addressed by `bundle.xbt/entry/path`.
    ///
    /// The entry record and the stream come from the same reader, even if
    /// the bundle is reopened concurrently.
    pub fn open(&self, path: &str) -> Result<BundleStream, BundleError> {
        let reader = self.reader(path)?;
        let entry = entry_in(&reader, path)?;
        Ok(BundleStream::new(reader, entry))
    }

    /// Evict a bundle. Returns false if it was not cached.
    pub fn release(&self, path: &str) -> bool {
        let (bundle, _) = split_bundle_path(path);
        let removed = self.readers.lock().remove(&bundle).is_some();
        if removed {
            log::debug!("Released bundle {}", bundle.display());
        }
        removed
    }

    /// Number of cached bundles.
    pub fn cached_len(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.readers.lock().contains_key(path)
    }

    /// Drop every cached reader.
    pub fn shutdown(&self) {
        let mut readers = self.readers.lock();
        log::debug!("Shutting down bundle cache ({} bundles)", readers.len());
        readers.clear();
    }
}

/// Resolve the entry part of `path` inside `reader`.
fn entry_in(reader: &BundleReader, path: &str) -> Result<Entry, BundleError> {
    let (_, name) = split_bundle_path(path);
    let name = name.ok_or_else(|| BundleError::UnknownEntry(String::new()))?;
    reader
        .entry(&name)
        .cloned()
        .ok_or(BundleError::UnknownEntry(name))
}
