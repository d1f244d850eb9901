//! Discovered package records

use crate::key::PackageKey;
use crate::manifest::PackageManifest;
use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Capability tag checked by the bootstrap sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageKind {
    /// Ordinary library package
    Plain,
    /// Package typed for the framework (`keel-*` types)
    FrameworkAware,
    /// Package with a bootstrap class
    Bootable,
}

impl PackageKind {
    fn of(manifest: &PackageManifest) -> Self {
        if manifest.bootstrap.is_some() {
            PackageKind::Bootable
        } else if manifest.is_framework_aware() {
            PackageKind::FrameworkAware
        } else {
            PackageKind::Plain
        }
    }
}

/// One discovered package
///
/// Records are immutable once built; replacing a package means re-running
/// discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    key: PackageKey,
    /// Relative to the scan base
    path: PathBuf,
    external_name: String,
    package_type: Option<String>,
    version: Option<semver::Version>,
    dependencies: BTreeSet<String>,
    #[serde(with = "table_text")]
    autoload: toml::Table,
    #[serde(with = "optional_table_text")]
    class_info: Option<toml::Table>,
    kind: PackageKind,
}

impl PackageRecord {
    /// Build a record from a manifest found in `dir` below `base`
    ///
    /// The key is the manifest's explicit `key` when present. Otherwise it is
    /// derived from the external name, falling back to the directory name.
    pub fn from_manifest(base: &Path, dir: &Path, manifest: PackageManifest) -> Result<Self> {
        let key = match &manifest.key {
            Some(explicit) => PackageKey::parse(explicit)?,
            None => Self::derive_key(dir, &manifest.name)?,
        };

        let path = dir.strip_prefix(base).unwrap_or(dir).to_path_buf();
        let kind = PackageKind::of(&manifest);
        let dependencies = manifest.dependencies.into_keys().collect();

        Ok(Self {
            key,
            path,
            external_name: manifest.name,
            package_type: manifest.package_type,
            version: manifest.version,
            dependencies,
            autoload: manifest.autoload,
            class_info: manifest.bootstrap,
            kind,
        })
    }

    fn derive_key(dir: &Path, external_name: &str) -> Result<PackageKey> {
        if let Some(key) = PackageKey::from_external_name(external_name) {
            return Ok(key);
        }

        dir.file_name()
            .and_then(|name| name.to_str())
            .and_then(PackageKey::from_directory_name)
            .ok_or_else(|| {
                PackageError::InvalidKey(format!(
                    "cannot derive a package key for '{}' at {}",
                    external_name,
                    dir.display()
                ))
            })
    }

    pub fn key(&self) -> &PackageKey {
        &self.key
    }

    /// Location relative to the scan base
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location resolved against the scan base
    pub fn absolute_path(&self, base: &Path) -> PathBuf {
        base.join(&self.path)
    }

    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    pub fn package_type(&self) -> Option<&str> {
        self.package_type.as_deref()
    }

    pub fn version(&self) -> Option<&semver::Version> {
        self.version.as_ref()
    }

    /// Declared prerequisite external names
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Whether `external_name` is a declared prerequisite
    pub fn depends_on(&self, external_name: &str) -> bool {
        self.dependencies.contains(external_name)
    }

    pub fn autoload(&self) -> &toml::Table {
        &self.autoload
    }

    pub fn class_info(&self) -> Option<&toml::Table> {
        self.class_info.as_ref()
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    pub fn is_bootable(&self) -> bool {
        self.kind == PackageKind::Bootable
    }
}

/// Opaque tables travel through the binary cache as TOML text
mod table_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(table: &toml::Table, serializer: S) -> Result<S::Ok, S::Error> {
        let text = toml::to_string(table).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<toml::Table, D::Error> {
        let text = String::deserialize(deserializer)?;
        toml::from_str(&text).map_err(serde::de::Error::custom)
    }
}

mod optional_table_text {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        table: &Option<toml::Table>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let text = table
            .as_ref()
            .map(toml::to_string)
            .transpose()
            .map_err(serde::ser::Error::custom)?;
        text.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<toml::Table>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        text.map(|t| toml::from_str(&t))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
