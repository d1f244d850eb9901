//! Configuration Loader
//!
//! Handles loading configuration and applying environment overrides.

use crate::project::ProjectConfig;
use crate::{ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Overrides `packages.path`
pub const ENV_PACKAGES_PATH: &str = "KEEL_PACKAGES_PATH";
/// Overrides `packages.inactive`
pub const ENV_INACTIVE_PATH: &str = "KEEL_INACTIVE_PATH";
/// Overrides `cache.state-path`
pub const ENV_STATE_PATH: &str = "KEEL_STATE_PATH";
/// Overrides `cache.legacy-state-path`
pub const ENV_LEGACY_STATE_PATH: &str = "KEEL_LEGACY_STATE_PATH";

/// Configuration loader
///
/// Loads configuration and merges it with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Project config (./keel.toml) - overrides defaults
/// 3. Environment variables (KEEL_*) - overrides project
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip KEEL_* environment overrides
    ignore_env: bool,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where keel.toml was found)
    pub project_root: Option<PathBuf>,

    /// Directory relative paths are resolved against
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Disable environment variable overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find keel.toml. When none is found the
    /// defaults apply, rooted at `start_dir`.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let project_config = self.apply_env_overrides(project_config)?;

        let base_dir = project_root
            .clone()
            .unwrap_or_else(|| start_dir.to_path_buf());

        Ok(Config {
            project: project_config,
            project_root,
            base_dir,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());
        let base_dir = project_root.clone().unwrap_or_default();

        Ok(Config {
            project: project_config,
            project_root,
            base_dir,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides to project config
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(path) = env::var(ENV_PACKAGES_PATH) {
            config.packages_mut().path = Some(PathBuf::from(path));
        }

        if let Ok(path) = env::var(ENV_INACTIVE_PATH) {
            config.packages_mut().inactive = Some(PathBuf::from(path));
        }

        if let Ok(path) = env::var(ENV_STATE_PATH) {
            config.cache_mut().state_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = env::var(ENV_LEGACY_STATE_PATH) {
            config.cache_mut().legacy_state_path = Some(PathBuf::from(path));
        }

        // Overrides go through the same checks as file values
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Build a configuration from an in-memory project config
    pub fn new(project: ProjectConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            project,
            project_root: None,
            base_dir: base_dir.into(),
        }
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has keel.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Directory that relative paths are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolved scan base
    pub fn packages_path(&self) -> PathBuf {
        self.resolve(self.project.packages_path())
    }

    /// Resolved inactive subtree (relative paths resolve against the packages path)
    pub fn inactive_path(&self) -> Option<PathBuf> {
        let packages = self.packages_path();
        self.project
            .inactive_path()
            .map(|inactive| packages.join(inactive))
    }

    /// Resolved directory for newly created packages
    pub fn default_target_path(&self) -> PathBuf {
        self.packages_path().join(self.project.default_target())
    }

    /// Resolved cache artifact path
    pub fn state_path(&self) -> PathBuf {
        self.resolve(self.project.state_path())
    }

    /// Resolved legacy cache artifact path
    pub fn legacy_state_path(&self) -> Option<PathBuf> {
        self.project.legacy_state_path().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        // Path::join keeps absolute paths as-is
        self.base_dir.join(path)
    }
}
