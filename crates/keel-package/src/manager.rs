//! Package manager: discovery, ordering and caching combined
//!
//! A manager starts empty. [`PackageManager::boot`] fills it either from the
//! state cache (warm start) or by scanning, ordering and saving (cold
//! start). All lookups afterwards are served from memory.

use crate::events::StateNotifier;
use crate::key::PackageKey;
use crate::load_order::LoadOrderComputer;
use crate::record::{PackageKind, PackageRecord};
use crate::scanner::Scanner;
use crate::skeleton::{self, ManifestOverrides};
use crate::state::{PackageState, StateStore};
use crate::{PackageError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Filesystem locations used by a package manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    /// Scan base; record paths are stored relative to it
    pub packages_path: PathBuf,
    /// Subtree below the scan base that is never scanned
    pub inactive_path: Option<PathBuf>,
    /// Parent directory of packages created without an explicit target
    pub default_target_path: PathBuf,
    /// Cache artifact
    pub state_path: PathBuf,
    /// Previous-generation cache artifact
    pub legacy_state_path: Option<PathBuf>,
}

impl ManagerOptions {
    /// Options with the default layout below `packages_path`
    pub fn new(packages_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        let packages_path = packages_path.into();
        Self {
            inactive_path: Some(packages_path.join(keel_config::project::DEFAULT_INACTIVE_PATH)),
            default_target_path: packages_path.join(keel_config::project::DEFAULT_TARGET),
            packages_path,
            state_path: state_path.into(),
            legacy_state_path: None,
        }
    }
}

impl From<&keel_config::Config> for ManagerOptions {
    fn from(config: &keel_config::Config) -> Self {
        Self {
            packages_path: config.packages_path(),
            inactive_path: config.inactive_path(),
            default_target_path: config.default_target_path(),
            state_path: config.state_path(),
            legacy_state_path: config.legacy_state_path(),
        }
    }
}

/// Ordering of [`PackageManager::list_packages`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Dependencies before dependents
    LoadOrder,
    /// Alphabetical by package key
    Key,
}

/// Owns the ordered package set of one process
#[derive(Debug)]
pub struct PackageManager {
    options: ManagerOptions,
    scanner: Scanner,
    store: StateStore,
    state: PackageState,
    /// lower-cased key -> position in `state`
    by_key: HashMap<String, usize>,
    /// external name -> position in `state`
    by_external_name: HashMap<String, usize>,
    booted: bool,
    warm: bool,
}

impl PackageManager {
    /// Create an empty, not yet booted manager
    pub fn new(options: ManagerOptions) -> Self {
        let scanner =
            Scanner::new(&options.packages_path).with_inactive(options.inactive_path.clone());
        let store = StateStore::new(&options.state_path)
            .with_legacy_path(options.legacy_state_path.clone());

        Self {
            options,
            scanner,
            store,
            state: PackageState::default(),
            by_key: HashMap::new(),
            by_external_name: HashMap::new(),
            booted: false,
            warm: false,
        }
    }

    /// Create a manager from loaded configuration
    pub fn from_config(config: &keel_config::Config) -> Self {
        Self::new(ManagerOptions::from(config))
    }

    /// Collaborators notified after each save; register before booting
    pub fn notifier_mut(&mut self) -> &mut StateNotifier {
        self.store.notifier_mut()
    }

    /// Load the package set
    ///
    /// Uses the state cache when it is valid, otherwise rebuilds it. A cache
    /// that cannot be written is logged and the process continues with the
    /// freshly built in-memory state; structural errors abort.
    pub fn boot(&mut self) -> Result<()> {
        if let Some(state) = self.store.load() {
            tracing::debug!(packages = state.len(), "warm start from package state cache");
            self.install(state);
            self.warm = true;
            self.booted = true;
            return Ok(());
        }

        tracing::debug!("cold start, scanning packages");
        match self.rescan_packages() {
            Ok(_) => {}
            Err(err @ PackageError::NotWritable { .. }) => {
                tracing::error!(error = %err, "package states could not be cached, continuing without cache");
            }
            Err(err) => return Err(err),
        }

        self.booted = true;
        Ok(())
    }

    /// Rebuild the package set from disk regardless of cache validity
    ///
    /// The in-memory state is replaced before the cache is written, so a
    /// `NotWritable` error still leaves the new state in effect. Structural
    /// errors leave both the in-memory state and the cache untouched.
    pub fn rescan_packages(&mut self) -> Result<&PackageState> {
        let records = self.scanner.discover()?;
        let order = LoadOrderComputer::new(&records).compute_load_order()?;
        let state = PackageState::from_load_order(records, &order)?;

        tracing::info!(
            packages = state.len(),
            base = %self.options.packages_path.display(),
            "rescanned packages"
        );

        self.install(state);
        self.warm = false;
        self.store.save(&self.state)?;

        Ok(&self.state)
    }

    /// Create a package skeleton and rescan
    ///
    /// `target_path` defaults to `<default target>/<key>`. The new package is
    /// only visible afterwards if it lies below the scan base. When the rescan
    /// rejects the tree with the new package in it, the skeleton is removed
    /// again and the error returned.
    pub fn create_package(
        &mut self,
        key: &str,
        overrides: ManifestOverrides,
        target_path: Option<PathBuf>,
    ) -> Result<&PackageRecord> {
        let key = PackageKey::parse(key)?;
        let manifest = overrides.to_manifest(&key);
        let target =
            target_path.unwrap_or_else(|| self.options.default_target_path.join(key.as_str()));

        self.ensure_unclaimed(&key, &manifest.name, &target)?;

        let footprint = skeleton::write_skeleton(&target, &manifest)?;
        tracing::info!(package = %key, path = %target.display(), "created package");

        if let Err(err) = self.rescan_packages() {
            if err.is_structural() {
                tracing::warn!(package = %key, error = %err, "rescan rejected new package, removing it");
                footprint.remove();
            }
            return Err(err);
        }

        self.get_package(key.as_str())
    }

    /// Fail with `KeyAlreadyExists` if the key or external name is taken
    ///
    /// The in-memory state may predate the packages on disk (warm start from
    /// an older cache, or not booted yet), so the tree is scanned as well.
    fn ensure_unclaimed(
        &self,
        key: &PackageKey,
        external_name: &str,
        target: &Path,
    ) -> Result<()> {
        if let Some(existing) = self.case_sensitive_key(key.as_str()) {
            return Err(PackageError::KeyAlreadyExists(existing.to_string()));
        }
        if self.by_external_name.contains_key(external_name) {
            return Err(PackageError::KeyAlreadyExists(external_name.to_string()));
        }

        let lookup = key.lookup_form();
        for record in self.scanner.discover()? {
            if record.key().lookup_form() == lookup {
                return Err(PackageError::KeyAlreadyExists(record.key().to_string()));
            }
            if record.external_name() == external_name {
                return Err(PackageError::KeyAlreadyExists(external_name.to_string()));
            }
        }

        if skeleton::is_occupied(target) {
            return Err(PackageError::KeyAlreadyExists(format!(
                "{} ({} is not empty)",
                key,
                target.display()
            )));
        }

        Ok(())
    }

    /// Look up a package by key, ignoring case
    pub fn get_package(&self, key: &str) -> Result<&PackageRecord> {
        self.position(key)
            .map(|index| &self.state.packages()[index])
            .ok_or_else(|| PackageError::UnknownPackage(key.to_string()))
    }

    /// Whether a package with this key (ignoring case) is known
    pub fn is_available(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Canonical spelling of a key
    pub fn case_sensitive_key(&self, key: &str) -> Option<&PackageKey> {
        self.position(key)
            .map(|index| self.state.packages()[index].key())
    }

    /// Look up a package by its external name
    pub fn package_by_external_name(&self, name: &str) -> Option<&PackageRecord> {
        self.by_external_name
            .get(name)
            .map(|&index| &self.state.packages()[index])
    }

    /// Snapshot of every known package by key
    pub fn available_packages(&self) -> BTreeMap<PackageKey, PackageRecord> {
        self.state
            .iter()
            .map(|record| (record.key().clone(), record.clone()))
            .collect()
    }

    /// Packages in load order
    pub fn packages_in_load_order(&self) -> &[PackageRecord] {
        self.state.packages()
    }

    /// Packages for listing
    pub fn list_packages(&self, order: ListOrder) -> Vec<&PackageRecord> {
        let mut packages: Vec<&PackageRecord> = self.state.iter().collect();
        if order == ListOrder::Key {
            packages.sort_by(|a, b| a.key().cmp(b.key()));
        }
        packages
    }

    /// Packages with the given capability tag, in load order
    pub fn packages_of_kind(&self, kind: PackageKind) -> Vec<&PackageRecord> {
        self.state.iter().filter(|r| r.kind() == kind).collect()
    }

    /// Packages with the given manifest type, in load order
    pub fn packages_of_type(&self, package_type: &str) -> Vec<&PackageRecord> {
        self.state
            .iter()
            .filter(|r| r.package_type() == Some(package_type))
            .collect()
    }

    /// Packages with a bootstrap class, in load order
    pub fn bootable_packages(&self) -> Vec<&PackageRecord> {
        self.packages_of_kind(PackageKind::Bootable)
    }

    /// Absolute location of a package
    pub fn package_path(&self, key: &str) -> Result<PathBuf> {
        self.get_package(key)
            .map(|record| record.absolute_path(&self.options.packages_path))
    }

    pub fn state(&self) -> &PackageState {
        &self.state
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn packages_path(&self) -> &Path {
        &self.options.packages_path
    }

    /// Whether the current state was loaded from the cache
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.by_key.get(&key.to_ascii_lowercase()).copied()
    }

    fn install(&mut self, state: PackageState) {
        self.by_key = state
            .iter()
            .enumerate()
            .map(|(index, record)| (record.key().lookup_form(), index))
            .collect();
        self.by_external_name = state
            .iter()
            .enumerate()
            .map(|(index, record)| (record.external_name().to_string(), index))
            .collect();
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_package(root: &Path, rel: &str, manifest: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.toml"), manifest).unwrap();
    }

    fn manager(temp: &TempDir) -> PackageManager {
        PackageManager::new(ManagerOptions::new(
            temp.path().join("Packages"),
            temp.path().join("Data/PackageStates.bin"),
        ))
    }

    #[test]
    fn test_unbooted_manager_is_empty() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        assert!(!manager.is_booted());
        assert!(!manager.is_available("Acme.Foo"));
        assert!(manager.available_packages().is_empty());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("Packages"),
            "Application/Foo",
            "[package]\nname = \"acme/foo\"\nkey = \"Acme.Foo\"\n",
        );

        let mut manager = manager(&temp);
        manager.boot().unwrap();

        assert!(manager.is_available("Acme.Foo"));
        assert!(manager.is_available("acme.foo"));
        assert_eq!(
            manager.get_package("ACME.FOO").unwrap().key().as_str(),
            "Acme.Foo"
        );
        assert_eq!(
            manager.case_sensitive_key("acme.foo").map(|k| k.as_str()),
            Some("Acme.Foo")
        );
        assert!(matches!(
            manager.get_package("Acme.Bar"),
            Err(PackageError::UnknownPackage(_))
        ));
    }

    #[test]
    fn test_list_orders() {
        let temp = TempDir::new().unwrap();
        let packages = temp.path().join("Packages");
        write_package(
            &packages,
            "Zed",
            "[package]\nname = \"acme/zed\"\n",
        );
        write_package(
            &packages,
            "Alpha",
            "[package]\nname = \"acme/alpha\"\n[dependencies]\n\"acme/zed\" = \"*\"\n",
        );

        let mut manager = manager(&temp);
        manager.boot().unwrap();

        let load: Vec<&str> = manager
            .list_packages(ListOrder::LoadOrder)
            .iter()
            .map(|r| r.external_name())
            .collect();
        assert_eq!(load, vec!["acme/zed", "acme/alpha"]);

        let by_key: Vec<&str> = manager
            .list_packages(ListOrder::Key)
            .iter()
            .map(|r| r.key().as_str())
            .collect();
        assert_eq!(by_key, vec!["Acme.Alpha", "Acme.Zed"]);
    }

    #[test]
    fn test_package_path_is_absolute() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("Packages"),
            "Application/Foo",
            "[package]\nname = \"acme/foo\"\n",
        );

        let mut manager = manager(&temp);
        manager.boot().unwrap();

        assert_eq!(
            manager.package_path("Acme.Foo").unwrap(),
            temp.path().join("Packages/Application/Foo")
        );
    }
}
