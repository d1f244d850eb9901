//! Directory skeleton and manifest for newly created packages

use crate::key::PackageKey;
use crate::manifest::{ManifestReader, PackageManifest};
use crate::{PackageError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Package type written when the caller does not choose one
pub const DEFAULT_PACKAGE_TYPE: &str = "keel-package";

/// Directories created inside every new package
pub const SKELETON_DIRECTORIES: &[&str] = &[
    "Classes",
    "Configuration",
    "Resources/Private",
    "Resources/Public",
    "Tests/Unit",
    "Tests/Functional",
];

/// Manifest values supplied by the caller of `create_package`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestOverrides {
    /// External name; derived from the key when absent
    pub name: Option<String>,
    pub package_type: Option<String>,
    pub description: Option<String>,
    pub version: Option<semver::Version>,
    /// Prerequisite external names
    pub dependencies: Vec<String>,
    /// Replaces the default autoload table
    pub autoload: Option<toml::Table>,
    pub bootstrap: Option<toml::Table>,
}

impl ManifestOverrides {
    pub fn with_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = Some(package_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Build the manifest written for a new package
    pub fn to_manifest(&self, key: &PackageKey) -> PackageManifest {
        let mut manifest = PackageManifest::new(
            self.name
                .clone()
                .unwrap_or_else(|| key.default_external_name()),
        );
        manifest.key = Some(key.to_string());
        manifest.package_type = Some(
            self.package_type
                .clone()
                .unwrap_or_else(|| DEFAULT_PACKAGE_TYPE.to_string()),
        );
        manifest.description = self.description.clone();
        manifest.version = self.version.clone();
        manifest.dependencies = self
            .dependencies
            .iter()
            .map(|dep| (dep.clone(), toml::Value::String("*".to_string())))
            .collect();
        manifest.autoload = self
            .autoload
            .clone()
            .unwrap_or_else(|| default_autoload(key));
        manifest.bootstrap = self.bootstrap.clone();
        manifest
    }
}

fn default_autoload(key: &PackageKey) -> toml::Table {
    let mut table = toml::Table::new();
    table.insert(
        "namespace".to_string(),
        toml::Value::String(key.to_string()),
    );
    table.insert(
        "roots".to_string(),
        toml::Value::Array(vec![toml::Value::String("Classes".to_string())]),
    );
    table
}

/// Paths a skeleton write creates, kept so the write can be undone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkeletonFootprint {
    created: Vec<PathBuf>,
}

impl SkeletonFootprint {
    /// Paths a skeleton write at `target` would create
    ///
    /// When `target` is missing this is its outermost missing ancestor.
    /// Otherwise it is every top-level skeleton entry not yet present.
    pub fn of(target: &Path) -> Self {
        let mut outermost = None;
        for ancestor in target.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor.exists() {
                break;
            }
            outermost = Some(ancestor.to_path_buf());
        }

        let created = match outermost {
            Some(root) => vec![root],
            None => {
                let mut entries: Vec<PathBuf> = SKELETON_DIRECTORIES
                    .iter()
                    .filter_map(|dir| dir.split('/').next())
                    .map(|top| target.join(top))
                    .collect();
                entries.dedup();
                entries.push(ManifestReader::manifest_path(target));
                entries.retain(|path| !path.exists());
                entries
            }
        };

        Self { created }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.created
    }

    /// Delete everything the skeleton write created; failures are logged
    pub fn remove(&self) {
        for path in &self.created {
            let removed = if path.is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match removed {
                Ok(()) => tracing::debug!(path = %path.display(), "removed package skeleton entry"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not remove package skeleton entry")
                }
            }
        }
    }
}

/// Create the package directory layout and its manifest below `target`
///
/// A write that fails partway removes what it created before returning.
pub fn write_skeleton(target: &Path, manifest: &PackageManifest) -> Result<SkeletonFootprint> {
    let footprint = SkeletonFootprint::of(target);

    if let Err(err) = write_entries(target, manifest) {
        footprint.remove();
        return Err(err);
    }

    Ok(footprint)
}

fn write_entries(target: &Path, manifest: &PackageManifest) -> Result<()> {
    for dir in SKELETON_DIRECTORIES {
        let path = target.join(dir);
        fs::create_dir_all(&path).map_err(|e| PackageError::not_writable(&path, e))?;
    }

    let manifest_path = ManifestReader::manifest_path(target);
    let content = manifest.to_toml_string().map_err(|e| {
        PackageError::not_writable(
            &manifest_path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    fs::write(&manifest_path, content).map_err(|e| PackageError::not_writable(&manifest_path, e))?;

    Ok(())
}

/// Whether `target` exists and already has content
pub fn is_occupied(target: &Path) -> bool {
    match fs::read_dir(target) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => target.exists(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_manifest() {
        let key = PackageKey::parse("Acme.Blog").unwrap();
        let manifest = ManifestOverrides::default().to_manifest(&key);

        assert_eq!(manifest.name, "acme/blog");
        assert_eq!(manifest.key.as_deref(), Some("Acme.Blog"));
        assert_eq!(manifest.package_type.as_deref(), Some(DEFAULT_PACKAGE_TYPE));
        assert_eq!(
            manifest.autoload.get("namespace"),
            Some(&toml::Value::String("Acme.Blog".to_string()))
        );
    }

    #[test]
    fn test_overrides_applied() {
        let key = PackageKey::parse("Acme.Blog").unwrap();
        let manifest = ManifestOverrides::default()
            .with_name("acme/weblog")
            .with_type("library")
            .with_dependency("acme/base")
            .to_manifest(&key);

        assert_eq!(manifest.name, "acme/weblog");
        assert_eq!(manifest.package_type.as_deref(), Some("library"));
        assert!(manifest.dependencies.contains_key("acme/base"));
    }

    #[test]
    fn test_write_skeleton() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("Acme.Blog");
        let key = PackageKey::parse("Acme.Blog").unwrap();
        let manifest = ManifestOverrides::default().to_manifest(&key);

        let footprint = write_skeleton(&target, &manifest).unwrap();
        assert_eq!(footprint.paths(), &[target.clone()]);

        for dir in SKELETON_DIRECTORIES {
            assert!(target.join(dir).is_dir(), "missing {}", dir);
        }
        assert_eq!(ManifestReader::read(&target).unwrap(), manifest);
    }

    #[test]
    fn test_is_occupied() {
        let temp = TempDir::new().unwrap();
        assert!(!is_occupied(&temp.path().join("missing")));
        assert!(!is_occupied(temp.path()));

        fs::write(temp.path().join("file"), "x").unwrap();
        assert!(is_occupied(temp.path()));
    }

    #[test]
    fn test_failed_manifest_write_removes_created_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("Acme.Blog");
        // A directory where the manifest file should go makes the write fail
        fs::create_dir_all(target.join("package.toml")).unwrap();

        let key = PackageKey::parse("Acme.Blog").unwrap();
        let manifest = ManifestOverrides::default().to_manifest(&key);
        let err = write_skeleton(&target, &manifest).unwrap_err();

        assert!(matches!(err, PackageError::NotWritable { .. }));
        for top in ["Classes", "Configuration", "Resources", "Tests"] {
            assert!(!target.join(top).exists(), "{} left behind", top);
        }
        assert!(target.join("package.toml").is_dir());
    }

    #[test]
    fn test_footprint_of_missing_target_is_outermost_missing_ancestor() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("Application/Acme.Blog");

        let footprint = SkeletonFootprint::of(&target);
        assert_eq!(footprint.paths(), &[temp.path().join("Application")]);

        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(target.join("Classes")).unwrap();
        let footprint = SkeletonFootprint::of(&target);
        assert!(!footprint.paths().contains(&target.join("Classes")));
        assert!(footprint.paths().contains(&target.join("package.toml")));
    }
}
