//! Error types for scadx operations.
//!
//! Library modules return these typed errors; the CLI boundary folds them
//! into `anyhow` for display.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the install engine and its collaborators.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The dependency spec string could not be decoded
    #[error("invalid dependency spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Fetching or checking out the source failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Reading or decoding a package manifest failed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A directory create/move/remove failed
    #[error("filesystem operation failed on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rewriting references inside installed sources failed
    #[error("reference rewrite failed under {path}: {message}")]
    Rewrite { path: PathBuf, message: String },

    /// The dependency graph loops back onto itself
    #[error("dependency cycle detected: {chain}")]
    CyclicDependency { chain: String },
}

/// Errors from materializing a repository at an exact revision.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The remote is unreachable or does not exist
    #[error("cannot reach repository '{url}': {message}")]
    NotFound { url: String, message: String },

    /// The selector matches nothing in the fetched history
    #[error("revision '{rev}' matches no branch, tag, or commit in '{url}'")]
    UnresolvableRevision { url: String, rev: String },

    /// The fetch destination is already occupied
    #[error("fetch destination already exists: {dest}")]
    DestinationExists { dest: PathBuf },

    /// The revision resolved but its tree could not be checked out
    #[error("checkout of '{rev}' failed for '{url}': {message}")]
    Checkout {
        url: String,
        rev: String,
        message: String,
    },
}

/// Errors from reading or writing a `scad.json` manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// No manifest file in the directory
    #[error("no scad.json found in {dir}")]
    NotFound { dir: PathBuf },

    /// The manifest file exists but is not valid JSON
    #[error("malformed scad.json at {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
