//! # scadx - OpenSCAD Package Manager
//!
//! scadx (binary `sx`) vendors OpenSCAD libraries from git, pins them to
//! exact revisions, and keeps `use <...>` references resolving after install.
//!
//! ## Features
//!
//! - **Git-based installs**: any clonable URL, pinned by tag, branch, or commit
//! - **Collision-free vendoring**: transitive dependencies land in
//!   `name#fingerprint` folders, so two revisions of one library coexist
//! - **Reference rewriting**: bracketed include paths inside installed
//!   modules are redirected to their disambiguated siblings
//! - **Reconciling installs**: repeated installs skip what is already
//!   vendored and prune what is no longer declared
//!
//! ## Quick Start
//!
//! ```bash
//! # Describe the project
//! sx init
//!
//! # Install everything scad.json declares
//! sx install
//! ```
//!
//! ## Module Organization
//!
//! - [`installer`] - The recursive install engine
//! - [`spec`] - Dependency spec string parsing
//! - [`fetch`] - Git clone and revision checkout
//! - [`manifest`] - `scad.json` reading and writing
//! - [`rewrite`] - Reference patching inside `.scad` sources

/// Typed install, fetch, and manifest errors.
pub mod error;

/// Git clone and revision pinning.
pub mod fetch;

/// The recursive dependency install engine.
pub mod installer;

/// `scad.json` reading and writing.
pub mod manifest;

/// Package index for `sx search`.
pub mod registry;

/// Reference rewriting inside `.scad` sources.
pub mod rewrite;

/// Dependency spec string parsing.
pub mod spec;

/// Terminal UI utilities (tables, colors).
pub mod ui;
