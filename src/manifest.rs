//! Package manifest (`scad.json`) reading and writing.
//!
//! One manifest exists per installable directory: the project root and each
//! vendored module. Reads also attach the short revision fingerprint taken
//! from the git metadata next to the manifest; the fingerprint is derived
//! state and is never written back.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Manifest file name, one per installable directory.
pub const MANIFEST_FILE: &str = "scad.json";

/// Length of the short revision fingerprint.
pub const FINGERPRINT_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub author: String,
    /// Declared dependencies: human-readable key -> spec string. A sorted
    /// map, so install order is deterministic across runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Short fingerprint of the checked-out commit, attached on read.
    #[serde(skip)]
    pub commit: String,
}

impl Manifest {
    /// Read the manifest in `dir`, attaching the revision fingerprint
    /// (empty when `dir` carries no git metadata).
    pub fn read(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    dir: dir.to_path_buf(),
                });
            }
            Err(err) => return Err(ManifestError::Io(err)),
        };

        let mut manifest: Manifest =
            serde_json::from_str(&data).map_err(|err| ManifestError::Malformed {
                path: path.clone(),
                message: err.to_string(),
            })?;
        manifest.commit = head_fingerprint(dir).unwrap_or_default();
        Ok(manifest)
    }

    /// Write the declared fields to `dir`'s manifest file.
    pub fn write(&self, dir: &Path) -> Result<(), ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let data = serde_json::to_string_pretty(self).map_err(|err| ManifestError::Malformed {
            path: path.clone(),
            message: err.to_string(),
        })?;
        fs::write(&path, data)?;
        Ok(())
    }
}

/// Short prefix of the HEAD commit hash when `dir` is a git working copy.
pub fn head_fingerprint(dir: &Path) -> Option<String> {
    let repo = git2::Repository::open(dir).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    let id = commit.id().to_string();
    Some(id[..FINGERPRINT_LEN].to_string())
}
