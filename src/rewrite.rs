//! Reference rewriting inside OpenSCAD sources.
//!
//! `use <...>` and `include <...>` paths are plain strings, so after a
//! dependency lands in a disambiguated folder its references must be
//! patched textually. Only the contents of bracketed tokens are touched.

use crate::error::InstallError;
use regex::{NoExpand, Regex};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const SOURCE_EXT: &str = "scad";

/// Rewrite every bracketed reference under `root`: inside each `<...>`
/// token, all matches of `from_pattern` become `to`. Returns the number
/// of files that changed.
///
/// Matching is substring replacement within the token, so a reference
/// like `name/sub/file.scad` keeps resolving after `name` is redirected
/// to a sibling folder.
pub fn rewrite_references(
    root: &Path,
    from_pattern: &str,
    to: &str,
) -> Result<usize, InstallError> {
    let token_re = Regex::new(r"<([^>]+)>").unwrap();
    let from_re = Regex::new(from_pattern).map_err(|err| InstallError::Rewrite {
        path: root.to_path_buf(),
        message: format!("invalid reference pattern '{}': {}", from_pattern, err),
    })?;

    let mut changed = 0;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension() else {
            continue;
        };
        if ext.to_string_lossy() != SOURCE_EXT {
            continue;
        }

        let content = fs::read_to_string(path).map_err(|err| InstallError::Rewrite {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let rewritten = token_re.replace_all(&content, |caps: &regex::Captures| {
            format!("<{}>", from_re.replace_all(&caps[1], NoExpand(to)))
        });

        if rewritten != content {
            fs::write(path, rewritten.as_bytes()).map_err(|err| InstallError::Rewrite {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            changed += 1;
        }
    }

    Ok(changed)
}
