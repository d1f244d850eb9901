//! Package discovery below a base directory

use crate::manifest::{ManifestReader, PackageManifest};
use crate::record::PackageRecord;
use crate::{PackageError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walks a package tree and collects manifests
///
/// A directory with a manifest is a package and its subtree is not searched
/// further, except for collections, whose contents are searched like a new
/// root. Hidden directories and the inactive subtree are never entered.
#[derive(Debug, Clone)]
pub struct Scanner {
    base: PathBuf,
    inactive: Option<PathBuf>,
}

impl Scanner {
    /// Create a scanner for `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            inactive: None,
        }
    }

    /// Skip everything below `path`
    pub fn with_inactive(mut self, path: Option<PathBuf>) -> Self {
        self.inactive = path;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Find every package manifest below the base
    ///
    /// Fails with `DiscoveryConflict` when two manifests declare the same
    /// external name. Output order is discovery order, not load order.
    pub fn scan(&self) -> Result<Vec<(PathBuf, PackageManifest)>> {
        if !self.base.is_dir() {
            tracing::debug!(base = %self.base.display(), "package base does not exist");
            return Ok(Vec::new());
        }

        let mut found: Vec<(PathBuf, PackageManifest)> = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        let mut walker = WalkDir::new(&self.base)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable path during package scan");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            if self.is_excluded(dir) {
                walker.skip_current_dir();
                continue;
            }

            if !ManifestReader::has_manifest(dir) {
                continue;
            }

            let manifest = ManifestReader::read(dir)?;

            if manifest.is_collection() {
                tracing::debug!(collection = %manifest.name, path = %dir.display(), "descending into collection");
                continue;
            }

            if let Some(first) = seen.get(&manifest.name) {
                return Err(PackageError::DiscoveryConflict {
                    name: manifest.name.clone(),
                    first: first.clone(),
                    second: dir.to_path_buf(),
                });
            }

            tracing::debug!(package = %manifest.name, path = %dir.display(), "discovered package");
            seen.insert(manifest.name.clone(), dir.to_path_buf());
            found.push((dir.to_path_buf(), manifest));

            // Packages do not nest inside packages
            walker.skip_current_dir();
        }

        Ok(found)
    }

    /// Scan and turn every manifest into a package record
    ///
    /// Besides external name conflicts, two packages whose keys differ only
    /// in case are a `DiscoveryConflict`.
    pub fn discover(&self) -> Result<Vec<PackageRecord>> {
        let mut records = Vec::new();
        let mut keys: HashMap<String, PathBuf> = HashMap::new();

        for (dir, manifest) in self.scan()? {
            let record = PackageRecord::from_manifest(&self.base, &dir, manifest)?;

            let lookup = record.key().lookup_form();
            if let Some(first) = keys.get(&lookup) {
                return Err(PackageError::DiscoveryConflict {
                    name: record.key().to_string(),
                    first: first.clone(),
                    second: dir,
                });
            }

            keys.insert(lookup, dir);
            records.push(record);
        }

        Ok(records)
    }

    fn is_excluded(&self, dir: &Path) -> bool {
        let hidden = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));

        hidden
            || self
                .inactive
                .as_deref()
                .is_some_and(|inactive| dir.starts_with(inactive))
    }
}
