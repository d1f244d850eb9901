//! Package manifest parsing and types (package.toml)

use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest file expected in every package directory
pub const MANIFEST_FILE_NAME: &str = "package.toml";

/// Package type marking a pass-through container of other packages
pub const COLLECTION_TYPE: &str = "collection";

/// Package type prefix of framework-aware packages
pub const FRAMEWORK_TYPE_PREFIX: &str = "keel-";

/// Validated package manifest
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    /// External name, unique across the discovered set
    pub name: String,
    /// Explicit package key, if declared
    pub key: Option<String>,
    pub package_type: Option<String>,
    pub version: Option<semver::Version>,
    pub description: Option<String>,
    /// Declared prerequisites (external name -> constraint, not interpreted)
    pub dependencies: BTreeMap<String, toml::Value>,
    /// Passthrough data for the class loader
    pub autoload: toml::Table,
    /// Bootstrap class information
    pub bootstrap: Option<toml::Table>,
}

/// On-disk shape of package.toml
#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    package: Option<PackageSection>,
    #[serde(default, alias = "require", skip_serializing_if = "BTreeMap::is_empty")]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    autoload: Option<toml::Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bootstrap: Option<toml::Table>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PackageSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<semver::Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl PackageManifest {
    /// Create a manifest with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            package_type: None,
            version: None,
            description: None,
            dependencies: BTreeMap::new(),
            autoload: toml::Table::new(),
            bootstrap: None,
        }
    }

    /// Parse manifest from TOML text; `path` is used for error reporting only
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let document: ManifestDocument =
            toml::from_str(content).map_err(|e| PackageError::malformed(path, e))?;

        let section = document.package.unwrap_or_default();
        let name = match section.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return Err(PackageError::ManifestIncomplete {
                    path: path.to_path_buf(),
                    field: "package.name".to_string(),
                })
            }
        };

        Ok(Self {
            name,
            key: section.key,
            package_type: section.package_type,
            version: section.version,
            description: section.description,
            dependencies: document.dependencies,
            autoload: document.autoload.unwrap_or_default(),
            bootstrap: document.bootstrap,
        })
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        let document = ManifestDocument {
            package: Some(PackageSection {
                name: Some(self.name.clone()),
                key: self.key.clone(),
                package_type: self.package_type.clone(),
                version: self.version.clone(),
                description: self.description.clone(),
            }),
            dependencies: self.dependencies.clone(),
            autoload: (!self.autoload.is_empty()).then(|| self.autoload.clone()),
            bootstrap: self.bootstrap.clone(),
        };
        toml::to_string_pretty(&document)
    }

    /// Whether this manifest describes a pass-through collection
    pub fn is_collection(&self) -> bool {
        self.package_type.as_deref() == Some(COLLECTION_TYPE)
    }

    /// Whether the package type marks a framework-aware package
    pub fn is_framework_aware(&self) -> bool {
        self.package_type
            .as_deref()
            .is_some_and(|t| t.starts_with(FRAMEWORK_TYPE_PREFIX))
    }

    /// Declared dependency names
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }
}

/// Reads manifests from package directories
pub struct ManifestReader;

impl ManifestReader {
    /// Location of the manifest inside a package directory
    pub fn manifest_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE_NAME)
    }

    /// Whether a directory carries a manifest
    pub fn has_manifest(dir: &Path) -> bool {
        Self::manifest_path(dir).is_file()
    }

    /// Read and validate the manifest of the package in `dir`
    pub fn read(dir: &Path) -> Result<PackageManifest> {
        let path = Self::manifest_path(dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PackageError::ManifestMissing {
                    path: dir.to_path_buf(),
                }
            } else {
                PackageError::io(&path, e)
            }
        })?;

        PackageManifest::parse(&content, &path)
    }
}
