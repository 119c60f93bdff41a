//! # scadx CLI Entry Point
//!
//! This is the main executable for the `sx` command-line tool.
//! It parses CLI arguments using clap and routes commands to the
//! installer, registry, and manifest modules.
//!
//! ## Command Structure
//!
//! - **Modules**: `install`, `uninstall`, `list`
//! - **Discovery**: `search`
//! - **Project**: `init`, `completion`

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use inquire::Text;
use std::fs;
use std::path::Path;

use scadx::installer::{InstallOptions, Installer, VENDOR_DIR};
use scadx::manifest::{MANIFEST_FILE, Manifest};
use scadx::registry::Registry;
use scadx::spec;
use scadx::ui;

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
    fn SetConsoleCP(wCodePageID: u32) -> i32;
}

#[cfg(windows)]
fn enable_windows_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_windows_utf8_console() {}

#[derive(Parser)]
#[command(name = "sx")]
#[command(about = "The OpenSCAD package manager", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install dependencies from scad.json, or add a single package
    Install {
        /// Package name or git URL, optionally with #branch, #tag or #commit
        package: Option<String>,
        /// Remove openscad_modules first and reinstall everything
        #[arg(long)]
        clean: bool,
    },
    /// Remove installed modules
    Uninstall {
        /// Module name to remove (omit to clear the whole tree)
        package: Option<String>,
    },
    /// List installed modules
    List,
    /// Search the registry for libraries
    Search {
        /// Query string
        query: String,
    },
    /// Initialize a new scad.json in existing directory
    Init,
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

fn main() -> Result<()> {
    enable_windows_utf8_console();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Install { package, clean }) => run_install(package.as_deref(), *clean),

        Some(Commands::Uninstall { package }) => run_uninstall(package.as_deref()),

        Some(Commands::List) => run_list(),

        Some(Commands::Search { query }) => {
            let results = Registry::search(query);
            if results.is_empty() {
                println!("{} No results found for '{}'", "x".red(), query);
            } else {
                let mut table = ui::Table::new(&["Name", "Repository"]);
                for (name, url) in results {
                    table.add_row(vec![name.bold().green().to_string(), url]);
                }
                table.print();
            }
            Ok(())
        }

        Some(Commands::Init) => init_project(),

        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }

        None => {
            print_splash();
            Ok(())
        }
    }
}

fn project_installer() -> Result<Installer> {
    let root = std::env::current_dir()?;
    let scratch = Installer::default_scratch().context("Could not find home directory")?;
    Ok(Installer::new(root, scratch))
}

fn run_install(package: Option<&str>, clean: bool) -> Result<()> {
    let installer = project_installer()?;

    match package {
        None => {
            let report = installer.install_current(InstallOptions { clean })?;
            if !report.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(raw) => {
            let spec_str = match resolve_input(raw) {
                Some(spec_str) => spec_str,
                None => {
                    println!("{} Package '{}' not found in registry", "x".red(), raw);
                    println!(
                        "   Try {} to browse known libraries.",
                        format!("sx search {}", raw).white().bold()
                    );
                    return Ok(());
                }
            };

            let module = spec::parse(&spec_str)?;
            installer.install(&spec_str, false)?;
            if installer.record_dependency(&spec_str)? {
                println!(
                    "{} Added {} to {}",
                    "✓".green(),
                    module.name.bold(),
                    MANIFEST_FILE
                );
            }
            Ok(())
        }
    }
}

/// Map a bare registry name to its git URL, carrying any `#selector`
/// through. Anything that already looks like a URL passes untouched.
fn resolve_input(raw: &str) -> Option<String> {
    let (base, selector) = match raw.split_once('#') {
        Some((base, selector)) => (base, Some(selector)),
        None => (raw, None),
    };

    if base.contains('/') || base.contains(':') {
        return Some(raw.to_string());
    }

    let url = Registry::get(base)?;
    match selector {
        Some(selector) => Some(format!("{}#{}", url, selector)),
        None => Some(url),
    }
}

fn run_uninstall(package: Option<&str>) -> Result<()> {
    let installer = project_installer()?;

    match package {
        None => {
            installer.uninstall_all()?;
            println!("{} Cleared {}", "🗑️".red(), VENDOR_DIR);
        }
        Some(name) => {
            let removed = installer.uninstall(name)?;
            if removed.is_empty() {
                println!("{} Module '{}' is not installed", "!".yellow(), name);
            } else {
                for folder in removed {
                    println!("{} Removed {}", "🗑️".red(), folder.bold());
                }
            }
        }
    }
    Ok(())
}

fn run_list() -> Result<()> {
    let installer = project_installer()?;
    let units = installer.list()?;

    if units.is_empty() {
        println!("{} No modules installed", "!".yellow());
        return Ok(());
    }

    let mut table = ui::Table::new(&["Name", "Folder", "Version", "Revision"]);
    for unit in units {
        let version = if unit.manifest.version.is_empty() {
            "-".dimmed().to_string()
        } else {
            unit.manifest.version.clone()
        };
        let revision = if unit.revision.is_empty() {
            "-".dimmed().to_string()
        } else {
            unit.revision.clone()
        };
        table.add_row(vec![
            unit.name.bold().green().to_string(),
            unit.folder.clone(),
            version,
            revision,
        ]);
    }
    table.print();
    Ok(())
}

fn print_splash() {
    println!();
    println!(
        "   {} {}",
        "scadx".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).green()
    );
    println!("   {}", "The OpenSCAD Package Manager".dimmed().italic());
    println!();

    let mut table = ui::Table::new(&["Command", "Description"]);
    table.add_row(vec![
        "install".cyan().to_string(),
        "Install dependencies from scad.json".to_string(),
    ]);
    table.add_row(vec![
        "install <pkg>".cyan().to_string(),
        "Add a package as a direct dependency".to_string(),
    ]);
    table.add_row(vec![
        "uninstall".cyan().to_string(),
        "Remove installed modules".to_string(),
    ]);
    table.add_row(vec![
        "list".cyan().to_string(),
        "List installed modules".to_string(),
    ]);
    table.add_row(vec![
        "search".cyan().to_string(),
        "Search the package registry".to_string(),
    ]);
    table.add_row(vec![
        "init".cyan().to_string(),
        "Create a scad.json in the current directory".to_string(),
    ]);
    table.print();

    println!();
    println!("   Run {} for detailed usage.", "sx --help".white().bold());
    println!();
}

fn init_project() -> Result<()> {
    if Path::new(MANIFEST_FILE).exists() {
        println!(
            "{} Error: Project already initialized ({} exists).",
            "x".red(),
            MANIFEST_FILE
        );
        return Ok(());
    }

    let current_dir = std::env::current_dir()?;
    let dir_name = current_dir
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("unknown"))
        .to_string_lossy();

    let name = Text::new("Project name?")
        .with_default(&dir_name)
        .prompt()?;
    let version = Text::new("Version?").with_default("1.0.0").prompt()?;
    let description = Text::new("Description?").prompt()?;
    let repository = Text::new("Repository URL?").prompt()?;
    let author = Text::new("Author?").prompt()?;

    let manifest = Manifest {
        name,
        version,
        description,
        repository,
        author,
        ..Manifest::default()
    };
    manifest.write(&current_dir)?;

    if !Path::new(".gitignore").exists() {
        fs::write(".gitignore", format!("{}/\n", VENDOR_DIR))?;
    }

    println!(
        "{} Initialized scadx project in current directory.",
        "✓".green()
    );
    Ok(())
}
