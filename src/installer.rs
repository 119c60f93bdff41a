//! The dependency install engine.
//!
//! One dependency edge walks parse, fetch, stage, resolve, promote, and
//! then recurses into the promoted copy's own declared dependencies and
//! redirects the copy's references at each installed child. Direct
//! dependencies occupy their bare logical name in the vendor tree;
//! transitive ones occupy `name#fingerprint`, so two revisions of the
//! same module can coexist side by side.

use crate::error::{InstallError, ManifestError};
use crate::fetch::{GitFetcher, SourceFetcher};
use crate::manifest::{self, Manifest};
use crate::rewrite;
use crate::spec::{self, ModuleRef};
use colored::*;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Vendor tree folder, created next to `scad.json`.
pub const VENDOR_DIR: &str = "openscad_modules";

/// One dependency realized into the vendor tree.
#[derive(Debug, Clone)]
pub struct InstalledUnit {
    pub name: String,
    pub folder: String,
    pub revision: String,
    pub manifest: Manifest,
}

/// A dependency edge that failed, kept so sibling edges still install.
#[derive(Debug)]
pub struct EdgeFailure {
    pub spec: String,
    pub error: InstallError,
}

/// Outcome of an install pass: what landed, what failed.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledUnit>,
    pub failures: Vec<EdgeFailure>,
}

impl InstallReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn note(&mut self, unit: InstalledUnit) {
        if !self.installed.iter().any(|u| u.folder == unit.folder) {
            self.installed.push(unit);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Wipe the vendor tree first instead of reconciling against it.
    pub clean: bool,
}

/// Realizes dependency edges into the vendor tree.
///
/// Owns the scratch area exclusively: fetched copies are staged there,
/// then either promoted into the vendor tree or discarded.
pub struct Installer {
    project_root: PathBuf,
    vendor_dir: PathBuf,
    scratch_dir: PathBuf,
    fetcher: Box<dyn SourceFetcher>,
}

impl Installer {
    pub fn new(project_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(project_root, scratch_dir, Box::new(GitFetcher))
    }

    /// Swap the fetch backend, for driving installs without a network.
    pub fn with_fetcher(
        project_root: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        fetcher: Box<dyn SourceFetcher>,
    ) -> Self {
        let project_root = project_root.into();
        let vendor_dir = project_root.join(VENDOR_DIR);
        Self {
            project_root,
            vendor_dir,
            scratch_dir: scratch_dir.into(),
            fetcher,
        }
    }

    /// Per-user scratch area, `~/.sx/tmp`.
    pub fn default_scratch() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sx").join("tmp"))
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }

    /// Install every dependency declared in the project's `scad.json`,
    /// reconciling against what is already vendored. Failed edges are
    /// collected in the report while their siblings continue; unreachable
    /// vendor entries are pruned only after a fully clean pass.
    pub fn install_current(&self, opts: InstallOptions) -> Result<InstallReport, InstallError> {
        let project = Manifest::read(&self.project_root)?;

        if opts.clean && self.vendor_dir.exists() {
            fs::remove_dir_all(&self.vendor_dir).map_err(|err| fs_error(&self.vendor_dir, err))?;
            println!("{} Cleared {}", "🗑️".red(), VENDOR_DIR);
        }
        fs::create_dir_all(&self.vendor_dir).map_err(|err| fs_error(&self.vendor_dir, err))?;

        if project.dependencies.is_empty() {
            println!(
                "{} No dependencies declared in {}",
                "!".yellow(),
                manifest::MANIFEST_FILE
            );
        } else {
            println!(
                "{} Installing {} dependencies...",
                "📦".blue(),
                project.dependencies.len()
            );
        }

        let mut report = InstallReport::default();
        for (key, spec_str) in &project.dependencies {
            let mut visiting = Vec::new();
            if let Err(err) = self.install_edge(spec_str, false, &mut visiting, &mut report) {
                println!("   {} {}: {}", "x".red(), key, err);
                report.failures.push(EdgeFailure {
                    spec: spec_str.clone(),
                    error: err,
                });
            }
        }

        if report.is_clean() {
            for folder in self.prune(&project)? {
                println!("   {} Pruned {}", "🗑️".red(), folder);
            }
            println!("{} All dependencies ready", "✓".green());
        } else {
            println!(
                "{} {} dependency edges failed",
                "!".yellow(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Install a single dependency edge. Returns the folder name the unit
    /// occupies in the vendor tree. Failures of transitive edges beneath
    /// it are reported and skipped; only this edge itself errors.
    pub fn install(&self, spec_str: &str, is_sub: bool) -> Result<String, InstallError> {
        fs::create_dir_all(&self.vendor_dir).map_err(|err| fs_error(&self.vendor_dir, err))?;
        let mut visiting = Vec::new();
        let mut report = InstallReport::default();
        let (_, folder) = self.install_edge(spec_str, is_sub, &mut visiting, &mut report)?;
        Ok(folder)
    }

    /// Record `spec_str` under its logical name in the project manifest.
    /// Returns false when there is no manifest to update or the entry is
    /// already present.
    pub fn record_dependency(&self, spec_str: &str) -> Result<bool, InstallError> {
        let module = spec::parse(spec_str)?;
        let mut project = match Manifest::read(&self.project_root) {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound { .. }) => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        if project.dependencies.get(&module.name).map(String::as_str) == Some(spec_str) {
            return Ok(false);
        }
        project
            .dependencies
            .insert(module.name.clone(), spec_str.to_string());
        project.write(&self.project_root)?;
        Ok(true)
    }

    /// Remove the whole vendor tree.
    pub fn uninstall_all(&self) -> Result<(), InstallError> {
        if self.vendor_dir.exists() {
            fs::remove_dir_all(&self.vendor_dir).map_err(|err| fs_error(&self.vendor_dir, err))?;
        }
        Ok(())
    }

    /// Remove one module: its bare folder, every `name#rev` revision of
    /// it, and any matching entry in the project manifest. Returns the
    /// folders removed.
    pub fn uninstall(&self, name: &str) -> Result<Vec<String>, InstallError> {
        let mut removed = Vec::new();
        for folder in self.vendor_entries()? {
            if module_base(&folder) == name {
                let path = self.vendor_dir.join(&folder);
                fs::remove_dir_all(&path).map_err(|err| fs_error(&path, err))?;
                removed.push(folder);
            }
        }

        match Manifest::read(&self.project_root) {
            Ok(mut project) => {
                let before = project.dependencies.len();
                project.dependencies.retain(|key, spec_str| {
                    key != name
                        && spec::parse(spec_str)
                            .map(|module| module.name != name)
                            .unwrap_or(true)
                });
                if project.dependencies.len() != before {
                    project.write(&self.project_root)?;
                }
            }
            Err(ManifestError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(removed)
    }

    /// Every unit currently in the vendor tree, sorted by folder name.
    pub fn list(&self) -> Result<Vec<InstalledUnit>, InstallError> {
        let mut units = Vec::new();
        for folder in self.vendor_entries()? {
            let path = self.vendor_dir.join(&folder);
            let manifest = match Manifest::read(&path) {
                Ok(manifest) => manifest,
                Err(_) => Manifest {
                    commit: manifest::head_fingerprint(&path).unwrap_or_default(),
                    ..Manifest::default()
                },
            };
            units.push(InstalledUnit {
                name: module_base(&folder).to_string(),
                folder: folder.clone(),
                revision: manifest.commit.clone(),
                manifest,
            });
        }
        Ok(units)
    }

    /// Drive one dependency edge through the install states. Returns the
    /// module's logical name and the vendor folder it resolved to.
    fn install_edge(
        &self,
        spec_str: &str,
        is_sub: bool,
        visiting: &mut Vec<String>,
        report: &mut InstallReport,
    ) -> Result<(String, String), InstallError> {
        let module = spec::parse(spec_str)?;

        if visiting.iter().any(|name| name == &module.name) {
            let mut chain = visiting.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(&module.name);
            return Err(InstallError::CyclicDependency { chain });
        }

        // Reconcile fast path: a direct dependency already occupying its
        // bare folder is kept without refetching. Its declared children
        // may still be missing after an earlier partial failure, so the
        // on-disk manifest is re-walked before the edge counts as done.
        if !is_sub {
            let existing = self.vendor_dir.join(&module.name);
            if existing.exists() {
                println!("   {} {} already installed", "⚡".green(), module.name);
                self.revisit(&module.name, &existing, visiting, report)?;
                return Ok((module.name.clone(), module.name.clone()));
            }
        }

        println!("   {} Installing {}...", "📦".blue(), describe(&module));

        // Any stale staging copy for this name is dropped before fetching.
        let scratch = self.scratch_dir.join(&module.name);
        if scratch.exists() {
            fs::remove_dir_all(&scratch).map_err(|err| fs_error(&scratch, err))?;
        }
        fs::create_dir_all(&self.scratch_dir).map_err(|err| fs_error(&self.scratch_dir, err))?;

        self.fetcher.fetch(&module.url, &module.rev, &scratch)?;

        let result = self.realize(&module, is_sub, &scratch, visiting, report);
        if scratch.exists() {
            let _ = fs::remove_dir_all(&scratch);
        }
        result
    }

    /// Stage, resolve, and promote a fetched copy, then install its own
    /// declared dependencies as transitive edges.
    fn realize(
        &self,
        module: &ModuleRef,
        is_sub: bool,
        scratch: &Path,
        visiting: &mut Vec<String>,
        report: &mut InstallReport,
    ) -> Result<(String, String), InstallError> {
        let staged = match Manifest::read(scratch) {
            Ok(manifest) => manifest,
            // A dependency need not itself be a declared package.
            Err(ManifestError::NotFound { .. }) => Manifest {
                commit: manifest::head_fingerprint(scratch).unwrap_or_default(),
                ..Manifest::default()
            },
            Err(err) => return Err(err.into()),
        };

        let folder = if is_sub && !staged.commit.is_empty() {
            format!("{}#{}", module.name, staged.commit)
        } else {
            module.name.clone()
        };

        let target = self.vendor_dir.join(&folder);
        if target.exists() {
            println!("   {} {} already installed", "⚡".green(), folder);
            return Ok((module.name.clone(), folder));
        }

        promote(scratch, &target)?;
        println!("   {} Installed {}", "✓".green(), folder);
        report.note(InstalledUnit {
            name: module.name.clone(),
            folder: folder.clone(),
            revision: staged.commit.clone(),
            manifest: staged.clone(),
        });

        visiting.push(module.name.clone());
        let mut rewrite_failure = None;
        for (key, dep_spec) in &staged.dependencies {
            if let Err(err) = self.install_child(&target, key, dep_spec, visiting, report) {
                rewrite_failure = Some(err);
                break;
            }
        }
        visiting.pop();

        match rewrite_failure {
            Some(err) => {
                // A unit whose references were never redirected counts as
                // failed, not installed; the caller records the failure.
                report.installed.retain(|unit| unit.folder != folder);
                Err(err)
            }
            None => Ok((module.name.clone(), folder)),
        }
    }

    /// Install one declared child of the unit at `target` as a transitive
    /// edge and redirect `target`'s references at it. Child failures are
    /// accumulated and skipped; only a rewrite failure is the unit's own
    /// error.
    fn install_child(
        &self,
        target: &Path,
        key: &str,
        dep_spec: &str,
        visiting: &mut Vec<String>,
        report: &mut InstallReport,
    ) -> Result<(), InstallError> {
        match self.install_edge(dep_spec, true, visiting, report) {
            Ok((child_name, child_folder)) => {
                let from = format!("{}/{}", VENDOR_DIR, child_name);
                let to = format!("../{}", child_folder);
                rewrite::rewrite_references(target, &from, &to)?;
                Ok(())
            }
            Err(err) => {
                println!("   {} {}: {}", "x".red(), key, err);
                report.failures.push(EdgeFailure {
                    spec: dep_spec.to_string(),
                    error: err,
                });
                Ok(())
            }
        }
    }

    /// Re-walk an already-vendored unit's declared dependencies. A child
    /// missing after an earlier partial failure is installed and the
    /// unit's references redirected at it; children with any revision on
    /// disk are revisited in turn, without fetching.
    fn revisit(
        &self,
        name: &str,
        target: &Path,
        visiting: &mut Vec<String>,
        report: &mut InstallReport,
    ) -> Result<(), InstallError> {
        // On-disk cycles stop here; everything on the path is installed.
        if visiting.iter().any(|n| n == name) {
            return Ok(());
        }
        let manifest = match Manifest::read(target) {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if manifest.dependencies.is_empty() {
            return Ok(());
        }

        let entries = self.vendor_entries()?;
        visiting.push(name.to_string());
        let mut failure = None;
        'deps: for (key, dep_spec) in &manifest.dependencies {
            let child = match spec::parse(dep_spec) {
                Ok(module) => module,
                Err(err) => {
                    println!("   {} {}: {}", "x".red(), key, err);
                    report.failures.push(EdgeFailure {
                        spec: dep_spec.clone(),
                        error: err,
                    });
                    continue;
                }
            };
            let present: Vec<&String> = entries
                .iter()
                .filter(|folder| module_base(folder) == child.name)
                .collect();
            if present.is_empty() {
                if let Err(err) = self.install_child(target, key, dep_spec, visiting, report) {
                    failure = Some(err);
                    break;
                }
            } else {
                for folder in present {
                    let path = self.vendor_dir.join(folder);
                    if let Err(err) = self.revisit(&child.name, &path, visiting, report) {
                        failure = Some(err);
                        break 'deps;
                    }
                }
            }
        }
        visiting.pop();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop vendor entries not reachable from the project manifest. The
    /// selector-to-fingerprint mapping is unknowable without fetching, so
    /// every on-disk revision of a reachable name is kept.
    fn prune(&self, project: &Manifest) -> Result<Vec<String>, InstallError> {
        let entries = self.vendor_entries()?;
        let mut reachable = BTreeSet::new();
        let mut queue: Vec<String> = project.dependencies.values().cloned().collect();

        while let Some(spec_str) = queue.pop() {
            let Ok(module) = spec::parse(&spec_str) else {
                continue;
            };
            if !reachable.insert(module.name.clone()) {
                continue;
            }
            for folder in entries.iter().filter(|f| module_base(f) == module.name) {
                if let Ok(found) = Manifest::read(&self.vendor_dir.join(folder)) {
                    queue.extend(found.dependencies.values().cloned());
                }
            }
        }

        let mut removed = Vec::new();
        for folder in entries {
            if !reachable.contains(module_base(&folder)) {
                let path = self.vendor_dir.join(&folder);
                fs::remove_dir_all(&path).map_err(|err| fs_error(&path, err))?;
                removed.push(folder);
            }
        }
        Ok(removed)
    }

    fn vendor_entries(&self) -> Result<Vec<String>, InstallError> {
        let mut entries = Vec::new();
        if !self.vendor_dir.exists() {
            return Ok(entries);
        }
        let dir = fs::read_dir(&self.vendor_dir).map_err(|err| fs_error(&self.vendor_dir, err))?;
        for entry in dir {
            let entry = entry.map_err(|err| fs_error(&self.vendor_dir, err))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                entries.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn describe(module: &ModuleRef) -> String {
    if module.rev.is_empty() {
        module.name.clone()
    } else {
        format!("{}#{}", module.name, module.rev)
    }
}

/// Folder names are `name` or `name#fingerprint`.
fn module_base(folder: &str) -> &str {
    folder.split_once('#').map_or(folder, |(base, _)| base)
}

fn promote(from: &Path, to: &Path) -> Result<(), InstallError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| fs_error(parent, err))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; the scratch area may live on a
    // different mount than the project.
    copy_dir_all(from, to).map_err(|err| fs_error(to, err))?;
    fs::remove_dir_all(from).map_err(|err| fs_error(from, err))
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(&entry.path(), &dst.join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn fs_error(path: &Path, source: io::Error) -> InstallError {
    InstallError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}
