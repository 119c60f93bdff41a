//! Integration tests for scadx install flows
//!
//! These tests verify the end-to-end behavior of the `sx install` engine
//! by building real module repositories with git2 and pointing a project
//! manifest at them, so every fetch, pin, and rewrite runs offline.

use scadx::error::{FetchError, InstallError, ManifestError};
use scadx::installer::{InstallOptions, Installer, VENDOR_DIR};
use scadx::manifest::{FINGERPRINT_LEN, Manifest};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// A local git repository standing in for a hosted module.
struct Remote {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Remote {
    fn url(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    fn open(&self) -> git2::Repository {
        git2::Repository::open(&self.root).unwrap()
    }

    fn write(&self, file: &str, content: &str) {
        fs::write(self.root.join(file), content).unwrap();
    }
}

fn commit_all(repo: &git2::Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("test", "test@example.org").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

fn short(oid: git2::Oid) -> String {
    oid.to_string()[..FINGERPRINT_LEN].to_string()
}

fn to_map(deps: &[(&str, &str)]) -> BTreeMap<String, String> {
    deps.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Create a module repository named `name` with a manifest, the given
/// source files, and a single commit. The repository directory is named
/// after the module, so dependency specs resolve to that logical name.
fn module_remote(name: &str, deps: &[(&str, &str)], files: &[(&str, &str)]) -> (Remote, git2::Oid) {
    let dir = tempfile::tempdir().expect("Failed to create remote directory");
    let root = dir.path().join(name);
    fs::create_dir_all(&root).unwrap();
    let repo = git2::Repository::init(&root).expect("Failed to init remote repository");

    let manifest = Manifest {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        dependencies: to_map(deps),
        ..Manifest::default()
    };
    manifest.write(&root).unwrap();
    for (file, content) in files {
        fs::write(root.join(file), content).unwrap();
    }
    let head = commit_all(&repo, "init");
    (Remote { _dir: dir, root }, head)
}

/// A project directory plus a private scratch area, wired up the same
/// way the CLI wires the current directory and `~/.sx/tmp`.
struct Project {
    dir: tempfile::TempDir,
    scratch: tempfile::TempDir,
}

impl Project {
    fn new(deps: &[(&str, &str)]) -> Self {
        let project = Self {
            dir: tempfile::tempdir().expect("Failed to create project directory"),
            scratch: tempfile::tempdir().expect("Failed to create scratch directory"),
        };
        project.declare(deps);
        project
    }

    fn declare(&self, deps: &[(&str, &str)]) {
        let manifest = Manifest {
            name: "workbench".to_string(),
            version: "1.0.0".to_string(),
            dependencies: to_map(deps),
            ..Manifest::default()
        };
        manifest.write(self.dir.path()).unwrap();
    }

    fn installer(&self) -> Installer {
        Installer::new(self.dir.path(), self.scratch.path().join("stage"))
    }

    fn vendor_path(&self, folder: &str) -> PathBuf {
        self.dir.path().join(VENDOR_DIR).join(folder)
    }

    fn vendored(&self) -> Vec<String> {
        let vendor = self.dir.path().join(VENDOR_DIR);
        if !vendor.exists() {
            return Vec::new();
        }
        let mut entries: Vec<String> = fs::read_dir(&vendor)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();
        entries
    }
}

#[test]
fn test_install_realizes_the_declared_tree() {
    let (lib, head) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[("gears", &lib.url())]);

    let report = project
        .installer()
        .install_current(InstallOptions::default())
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.installed.len(), 1);
    assert_eq!(report.installed[0].name, "gears");
    assert_eq!(report.installed[0].folder, "gears");
    assert_eq!(report.installed[0].revision, short(head));
    assert_eq!(project.vendored(), vec!["gears"]);
    assert!(project.vendor_path("gears").join("gears.scad").exists());
}

#[test]
fn test_second_install_is_a_no_op() {
    let (lib, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[("gears", &lib.url())]);
    let installer = project.installer();

    installer.install_current(InstallOptions::default()).unwrap();
    let second = installer.install_current(InstallOptions::default()).unwrap();

    assert!(second.is_clean());
    assert!(second.installed.is_empty());
    assert_eq!(project.vendored(), vec!["gears"]);
}

#[test]
fn test_pinned_revisions_of_one_module_coexist() {
    let (shapes, first) = module_remote("shapes", &[], &[("shapes.scad", "cube(1);\n")]);
    let repo = shapes.open();
    repo.tag_lightweight("v1", repo.find_commit(first).unwrap().as_object(), false)
        .unwrap();
    shapes.write("shapes.scad", "sphere(2);\n");
    let second = commit_all(&repo, "rounder");

    let (holder, _) = module_remote(
        "holder",
        &[("shapes", &format!("{}#v1", shapes.url()))],
        &[(
            "holder.scad",
            "use <openscad_modules/shapes/shapes.scad>\nuse <MCAD/involute_gears.scad>\n",
        )],
    );
    let (stand, _) = module_remote(
        "stand",
        &[("shapes", &shapes.url())],
        &[("stand.scad", "use <openscad_modules/shapes/shapes.scad>\n")],
    );

    let project = Project::new(&[("holder", &holder.url()), ("stand", &stand.url())]);
    let report = project
        .installer()
        .install_current(InstallOptions::default())
        .unwrap();

    assert!(report.is_clean());
    let mut expected = vec![
        "holder".to_string(),
        "stand".to_string(),
        format!("shapes#{}", short(first)),
        format!("shapes#{}", short(second)),
    ];
    expected.sort();
    assert_eq!(project.vendored(), expected);

    // Each parent's reference points at the copy pinned for it; the
    // unrelated MCAD reference is left alone.
    assert_eq!(
        fs::read_to_string(project.vendor_path("holder").join("holder.scad")).unwrap(),
        format!(
            "use <../shapes#{}/shapes.scad>\nuse <MCAD/involute_gears.scad>\n",
            short(first)
        )
    );
    assert_eq!(
        fs::read_to_string(project.vendor_path("stand").join("stand.scad")).unwrap(),
        format!("use <../shapes#{}/shapes.scad>\n", short(second))
    );
}

#[test]
fn test_unresolvable_selector_fails_that_edge_only() {
    let (good, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let (bad, _) = module_remote("wheels", &[], &[("wheels.scad", "module wheel() {}\n")]);

    let project = Project::new(&[
        ("gears", &good.url()),
        ("wheels", &format!("{}#no-such-tag", bad.url())),
    ]);
    let report = project
        .installer()
        .install_current(InstallOptions::default())
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        InstallError::Fetch(FetchError::UnresolvableRevision { .. })
    ));
    assert_eq!(project.vendored(), vec!["gears"]);
}

#[test]
fn test_reconcile_prunes_undeclared_modules() {
    let (gears, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let (wheels, _) = module_remote("wheels", &[], &[("wheels.scad", "module wheel() {}\n")]);

    let project = Project::new(&[("gears", &gears.url()), ("wheels", &wheels.url())]);
    let installer = project.installer();
    installer.install_current(InstallOptions::default()).unwrap();
    assert_eq!(project.vendored(), vec!["gears", "wheels"]);

    project.declare(&[("gears", &gears.url())]);
    let report = installer.install_current(InstallOptions::default()).unwrap();

    assert!(report.is_clean());
    assert_eq!(project.vendored(), vec!["gears"]);
}

#[test]
fn test_rerun_after_failure_installs_missing_children() {
    let holding = tempfile::tempdir().unwrap();
    let child_root = holding.path().join("shapes");
    let (parent, _) = module_remote(
        "holder",
        &[("shapes", &child_root.to_string_lossy())],
        &[("holder.scad", "use <openscad_modules/shapes/shapes.scad>\n")],
    );
    let project = Project::new(&[("holder", &parent.url())]);
    let installer = project.installer();

    // The child remote does not exist yet, so only the parent lands.
    let first = installer.install_current(InstallOptions::default()).unwrap();
    assert!(!first.is_clean());
    assert!(project.vendor_path("holder").exists());
    assert!(!project.vendored().iter().any(|f| f.starts_with("shapes")));

    let repo = git2::Repository::init(&child_root).unwrap();
    fs::write(child_root.join("shapes.scad"), "cube(1);\n").unwrap();
    let child_manifest = Manifest {
        name: "shapes".to_string(),
        version: "1.0.0".to_string(),
        ..Manifest::default()
    };
    child_manifest.write(&child_root).unwrap();
    let head = commit_all(&repo, "init");

    // Re-running install is the recovery path: the existing holder entry
    // is kept, its missing child is fetched and redirected.
    let second = installer.install_current(InstallOptions::default()).unwrap();
    assert!(second.is_clean());
    let folder = format!("shapes#{}", short(head));
    assert!(project.vendor_path(&folder).exists());
    assert_eq!(
        fs::read_to_string(project.vendor_path("holder").join("holder.scad")).unwrap(),
        format!("use <../{}/shapes.scad>\n", folder)
    );
}

#[test]
fn test_clean_install_restores_tampered_copies() {
    let (gears, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[("gears", &gears.url())]);
    let installer = project.installer();

    installer.install_current(InstallOptions::default()).unwrap();
    fs::write(project.vendor_path("gears").join("gears.scad"), "tampered\n").unwrap();

    let report = installer
        .install_current(InstallOptions { clean: true })
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.installed.len(), 1);
    assert_eq!(
        fs::read_to_string(project.vendor_path("gears").join("gears.scad")).unwrap(),
        "module gear() {}\n"
    );
}

#[test]
fn test_single_install_records_the_dependency() {
    let (lib, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[]);
    let installer = project.installer();

    let folder = installer.install(&lib.url(), false).unwrap();
    assert_eq!(folder, "gears");
    assert!(installer.record_dependency(&lib.url()).unwrap());
    assert!(!installer.record_dependency(&lib.url()).unwrap());

    let manifest = Manifest::read(project.dir.path()).unwrap();
    assert_eq!(manifest.dependencies.get("gears"), Some(&lib.url()));
}

#[test]
fn test_uninstall_clears_tree_and_declarations() {
    let (gears, _) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[("gears", &gears.url())]);
    let installer = project.installer();
    installer.install_current(InstallOptions::default()).unwrap();

    let removed = installer.uninstall("gears").unwrap();
    assert_eq!(removed, vec!["gears"]);
    assert!(project.vendored().is_empty());
    assert!(
        Manifest::read(project.dir.path())
            .unwrap()
            .dependencies
            .is_empty()
    );

    installer.uninstall_all().unwrap();
    assert!(!project.dir.path().join(VENDOR_DIR).exists());
}

#[test]
fn test_list_reports_installed_units() {
    let (lib, head) = module_remote("gears", &[], &[("gears.scad", "module gear() {}\n")]);
    let project = Project::new(&[("gears", &lib.url())]);
    let installer = project.installer();
    installer.install_current(InstallOptions::default()).unwrap();

    let units = installer.list().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].name, "gears");
    assert_eq!(units[0].folder, "gears");
    assert_eq!(units[0].manifest.version, "1.0.0");
    assert_eq!(units[0].revision, short(head));
}

#[test]
fn test_install_without_project_manifest_is_fatal() {
    let project = Project {
        dir: tempfile::tempdir().unwrap(),
        scratch: tempfile::tempdir().unwrap(),
    };

    let err = project
        .installer()
        .install_current(InstallOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Manifest(ManifestError::NotFound { .. })
    ));
}
