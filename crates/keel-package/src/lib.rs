//! Keel package engine
//!
//! Discovers packages below a base directory, orders them so that every
//! package loads after its dependencies, and keeps the ordered result in a
//! binary state cache so warm starts skip the filesystem scan.

pub mod events;
pub mod key;
pub mod load_order;
pub mod manager;
pub mod manifest;
pub mod record;
pub mod scanner;
pub mod skeleton;
pub mod state;

pub use events::{BoxError, CompiledCodeCache, PackageStatesListener, StateNotifier};
pub use key::PackageKey;
pub use load_order::LoadOrderComputer;
pub use manager::{ListOrder, ManagerOptions, PackageManager};
pub use manifest::{ManifestReader, PackageManifest, MANIFEST_FILE_NAME};
pub use record::{PackageKind, PackageRecord};
pub use scanner::Scanner;
pub use skeleton::{ManifestOverrides, SkeletonFootprint};
pub use state::{ArtifactInfo, PackageState, StateStore};

use std::path::PathBuf;

/// Package engine errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("No manifest found in {}", .path.display())]
    ManifestMissing { path: PathBuf },

    #[error("Malformed manifest {}: {reason}", .path.display())]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("Manifest {} is missing required field '{field}'", .path.display())]
    ManifestIncomplete { path: PathBuf, field: String },

    #[error("Invalid package key: {0}")]
    InvalidKey(String),

    #[error(
        "Package '{name}' is declared twice: {} and {}",
        .first.display(),
        .second.display()
    )]
    DiscoveryConflict {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Circular dependency detected among packages: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Cannot write {}: {source}", .path.display())]
    NotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    #[error("Package already exists: {0}")]
    KeyAlreadyExists(String),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] keel_config::ConfigError),
}

impl PackageError {
    /// Create a malformed manifest error
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ManifestMalformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a not-writable error
    pub fn not_writable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::NotWritable {
            path: path.into(),
            source,
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error invalidates the discovered package set
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ManifestMissing { .. }
                | Self::ManifestMalformed { .. }
                | Self::ManifestIncomplete { .. }
                | Self::InvalidKey(_)
                | Self::DiscoveryConflict { .. }
                | Self::CycleDetected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
