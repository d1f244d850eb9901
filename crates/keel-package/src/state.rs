//! Package state cache (PackageStates.bin)
//!
//! The ordered package set is persisted so warm starts skip discovery. The
//! artifact is a fixed header followed by a bincode body:
//!
//! ```text
//! 0..8    magic "KEELPKGS"
//! 8..12   format version (u32, little endian)
//! 12..44  SHA-256 of the body
//! 44..    body
//! ```
//!
//! Any artifact that cannot be read back exactly is treated as absent.

use crate::events::StateNotifier;
use crate::record::PackageRecord;
use crate::{PackageError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"KEELPKGS";
const HEADER_LEN: usize = MAGIC.len() + 4 + 32;

/// Ordered package set; the order of `packages` is the load order
#[derive(Debug, Clone, PartialEq)]
pub struct PackageState {
    version: u32,
    packages: Vec<PackageRecord>,
}

impl PackageState {
    /// Current cache format version
    pub const FORMAT_VERSION: u32 = 1;

    /// Create a state from records already in load order
    pub fn new(packages: Vec<PackageRecord>) -> Self {
        Self {
            version: Self::FORMAT_VERSION,
            packages,
        }
    }

    /// Arrange records according to `order` (a sequence of external names)
    pub fn from_load_order(records: Vec<PackageRecord>, order: &[String]) -> Result<Self> {
        let mut by_name: std::collections::HashMap<String, PackageRecord> = records
            .into_iter()
            .map(|r| (r.external_name().to_string(), r))
            .collect();

        let packages = order
            .iter()
            .map(|name| {
                by_name
                    .remove(name)
                    .ok_or_else(|| PackageError::UnknownPackage(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(packages))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Records in load order
    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    /// Look up a record by external name
    pub fn get(&self, external_name: &str) -> Option<&PackageRecord> {
        self.packages
            .iter()
            .find(|p| p.external_name() == external_name)
    }

    /// External names in load order
    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|p| p.external_name())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageRecord> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Verify state integrity
    pub fn verify(&self) -> std::result::Result<(), String> {
        if self.version != Self::FORMAT_VERSION {
            return Err(format!(
                "state version {} does not match supported version {}",
                self.version,
                Self::FORMAT_VERSION
            ));
        }

        let mut seen = HashSet::new();
        for pkg in &self.packages {
            if !seen.insert(pkg.external_name()) {
                return Err(format!(
                    "duplicate package in state: {}",
                    pkg.external_name()
                ));
            }
        }

        Ok(())
    }
}

impl Default for PackageState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<'a> IntoIterator for &'a PackageState {
    type Item = &'a PackageRecord;
    type IntoIter = std::slice::Iter<'a, PackageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

/// Metadata of a cache artifact on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInfo {
    pub version: u32,
    /// When the artifact was written (RFC 3339)
    pub generated_at: String,
    pub package_count: usize,
    /// Artifact size in bytes
    pub size: u64,
}

#[derive(Serialize)]
struct BodyRef<'a> {
    generated_at: &'a str,
    packages: &'a [PackageRecord],
}

#[derive(Deserialize)]
struct Body {
    generated_at: String,
    packages: Vec<PackageRecord>,
}

/// Why an artifact was not usable
#[derive(Debug)]
enum Rejected {
    Stale(u32),
    Corrupt(String),
}

/// Reads and writes the package state cache artifact
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    legacy_path: Option<PathBuf>,
    notifier: StateNotifier,
}

impl StateStore {
    /// Create a store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
            notifier: StateNotifier::new(),
        }
    }

    /// Previous-generation artifact removed after each save
    pub fn with_legacy_path(mut self, legacy_path: Option<PathBuf>) -> Self {
        self.legacy_path = legacy_path;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut StateNotifier {
        &mut self.notifier
    }

    /// Load the cached state
    ///
    /// Returns `None` when the artifact is missing, unreadable, corrupt or
    /// written by a different format version.
    pub fn load(&self) -> Option<PackageState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "no usable package state cache");
                return None;
            }
        };

        match decode(&bytes) {
            Ok((_, state)) => {
                tracing::debug!(path = %self.path.display(), packages = state.len(), "loaded package state cache");
                Some(state)
            }
            Err(Rejected::Stale(version)) => {
                tracing::debug!(
                    path = %self.path.display(),
                    found = version,
                    expected = PackageState::FORMAT_VERSION,
                    "package state cache has a different format version"
                );
                None
            }
            Err(Rejected::Corrupt(reason)) => {
                tracing::warn!(path = %self.path.display(), %reason, "ignoring corrupt package state cache");
                None
            }
        }
    }

    /// Read artifact metadata without building records for the caller
    pub fn inspect(&self) -> Option<ArtifactInfo> {
        let bytes = std::fs::read(&self.path).ok()?;
        let (generated_at, state) = decode(&bytes).ok()?;
        Some(ArtifactInfo {
            version: state.version(),
            generated_at,
            package_count: state.len(),
            size: bytes.len() as u64,
        })
    }

    /// Persist `state`, stamped with the current format version
    ///
    /// On success the legacy artifact is removed, the compiled-code cache is
    /// invalidated for the artifact path and listeners are notified. None of
    /// these follow-ups can fail the save.
    pub fn save(&self, state: &PackageState) -> Result<()> {
        let bytes = encode(state, PackageState::FORMAT_VERSION).map_err(|e| {
            PackageError::not_writable(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PackageError::not_writable(parent, e))?;
            }
        }

        // One blocking write; a torn artifact fails the checksum on the next load
        std::fs::write(&self.path, &bytes)
            .map_err(|e| PackageError::not_writable(&self.path, e))?;

        tracing::info!(path = %self.path.display(), packages = state.len(), "saved package state cache");

        self.remove_legacy_artifact();
        self.notifier.invalidate_compiled(&self.path);
        self.notifier.notify_updated(state);

        Ok(())
    }

    fn remove_legacy_artifact(&self) {
        let Some(legacy) = &self.legacy_path else {
            return;
        };
        if legacy == &self.path {
            return;
        }

        match std::fs::remove_file(legacy) {
            Ok(()) => {
                tracing::debug!(path = %legacy.display(), "removed legacy package state artifact")
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %legacy.display(), error = %err, "could not remove legacy package state artifact")
            }
        }
    }
}

fn encode(state: &PackageState, version: u32) -> std::result::Result<Vec<u8>, bincode::Error> {
    let generated_at =
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let body = bincode::serialize(&BodyRef {
        generated_at: &generated_at,
        packages: &state.packages,
    })?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(&body));
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> std::result::Result<(String, PackageState), Rejected> {
    if bytes.len() < HEADER_LEN {
        return Err(Rejected::Corrupt("artifact is truncated".to_string()));
    }

    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(Rejected::Corrupt("unknown artifact format".to_string()));
    }

    let (version, rest) = rest.split_at(4);
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(version);
    let version = u32::from_le_bytes(version_bytes);
    if version != PackageState::FORMAT_VERSION {
        return Err(Rejected::Stale(version));
    }

    let (checksum, body) = rest.split_at(32);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(Rejected::Corrupt("checksum mismatch".to_string()));
    }

    let body: Body =
        bincode::deserialize(body).map_err(|e| Rejected::Corrupt(e.to_string()))?;

    let state = PackageState {
        version,
        packages: body.packages,
    };
    state.verify().map_err(Rejected::Corrupt)?;

    Ok((body.generated_at, state))
}
