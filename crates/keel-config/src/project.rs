//! Project Configuration (keel.toml)
//!
//! Handles project-level configuration stored in `keel.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default scan base, relative to the project root
pub const DEFAULT_PACKAGES_PATH: &str = "Packages";
/// Default legacy subtree skipped during scans, relative to the packages path
pub const DEFAULT_INACTIVE_PATH: &str = "Inactive";
/// Default sub-directory of the packages path that receives created packages
pub const DEFAULT_TARGET: &str = "Application";
/// Default location of the package state cache
pub const DEFAULT_STATE_PATH: &str = "Data/Temporary/PackageStates.bin";
/// Default location of the previous-generation cache artifact
pub const DEFAULT_LEGACY_STATE_PATH: &str = "Configuration/PackageStates.bin";

/// Project configuration from keel.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Package discovery settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<PackagesConfig>,

    /// Package state cache settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

/// Package discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PackagesConfig {
    /// Base directory scanned for packages (default: "Packages")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Legacy subtree below `path` that is never scanned; empty disables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive: Option<PathBuf>,

    /// Directory below `path` that receives newly created packages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<PathBuf>,
}

/// Package state cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Cache artifact location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// Previous-generation artifact removed after every save; empty disables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_state_path: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parse and validate project configuration from TOML text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(packages) = &self.packages {
            if let Some(path) = &packages.path {
                require_non_empty("packages.path", path)?;
            }
            if let Some(target) = &packages.default_target {
                require_non_empty("packages.default-target", target)?;
                if target.is_absolute() {
                    return Err(ConfigError::InvalidValue {
                        field: "packages.default-target".to_string(),
                        reason: "must be relative to the packages path".to_string(),
                    });
                }
            }
        }

        if let Some(cache) = &self.cache {
            if let Some(state) = &cache.state_path {
                require_non_empty("cache.state-path", state)?;
            }
        }

        Ok(())
    }

    /// Configured scan base, or the default
    pub fn packages_path(&self) -> &Path {
        self.packages
            .as_ref()
            .and_then(|p| p.path.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_PACKAGES_PATH))
    }

    /// Configured inactive subtree; `None` when explicitly disabled
    pub fn inactive_path(&self) -> Option<&Path> {
        match self.packages.as_ref().and_then(|p| p.inactive.as_deref()) {
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path),
            None => Some(Path::new(DEFAULT_INACTIVE_PATH)),
        }
    }

    /// Configured target directory for created packages, or the default
    pub fn default_target(&self) -> &Path {
        self.packages
            .as_ref()
            .and_then(|p| p.default_target.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_TARGET))
    }

    /// Configured cache artifact path, or the default
    pub fn state_path(&self) -> &Path {
        self.cache
            .as_ref()
            .and_then(|c| c.state_path.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_STATE_PATH))
    }

    /// Configured legacy artifact path; `None` when explicitly disabled
    pub fn legacy_state_path(&self) -> Option<&Path> {
        match self.cache.as_ref().and_then(|c| c.legacy_state_path.as_deref()) {
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path),
            None => Some(Path::new(DEFAULT_LEGACY_STATE_PATH)),
        }
    }

    pub(crate) fn packages_mut(&mut self) -> &mut PackagesConfig {
        self.packages.get_or_insert_with(PackagesConfig::default)
    }

    pub(crate) fn cache_mut(&mut self) -> &mut CacheConfig {
        self.cache.get_or_insert_with(CacheConfig::default)
    }
}

fn require_non_empty(field: &str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "path cannot be empty".to_string(),
        });
    }
    Ok(())
}
