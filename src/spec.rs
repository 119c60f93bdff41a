//! Dependency spec string decoding.
//!
//! A spec is a fetch URL with an optional `#selector` fragment, e.g.
//! `https://gitlab.com/openscad-modules/breadboard.git#v2`. The selector
//! names a branch, tag, or commit; which one is decided later, at fetch
//! time.

use crate::error::InstallError;

/// A decoded dependency reference: where to fetch from and what to pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    /// Human-facing module identity, the last URL path segment.
    pub name: String,
    /// Fetch location with the selector stripped.
    pub url: String,
    /// Branch, tag, or commit selector; empty means default branch tip.
    pub rev: String,
}

/// Decode a dependency spec string. Pure, no I/O.
pub fn parse(spec: &str) -> Result<ModuleRef, InstallError> {
    let raw = spec.trim();

    let (url, fragment) = match raw.split_once('#') {
        Some((before, after)) => (before, after),
        None => (raw, ""),
    };

    if url.is_empty() {
        return Err(invalid(spec, "empty fetch URL"));
    }

    let name = logical_name(url);
    if name.is_empty() {
        return Err(invalid(spec, "empty module name"));
    }

    Ok(ModuleRef {
        name: name.to_string(),
        url: url.to_string(),
        rev: fragment.trim().to_string(),
    })
}

/// Last path segment of the URL, minus a trailing `.git` suffix.
///
/// Handles `scheme://host/path`, scp-style `user@host:path`, and plain
/// filesystem paths (local repositories are valid fetch sources).
fn logical_name(url: &str) -> &str {
    let without_query = match url.split_once('?') {
        Some((before, _)) => before,
        None => url,
    };

    let path = if let Some(idx) = without_query.find("://") {
        // scheme://host/path -> path (no path segment means no name)
        match without_query[idx + 3..].split_once('/') {
            Some((_, rest)) => rest,
            None => "",
        }
    } else if let Some((head, tail)) = without_query.split_once(':') {
        // user@host:group/mod.git
        if head.contains('@') { tail } else { without_query }
    } else {
        without_query
    };

    let base = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    base.strip_suffix(".git").unwrap_or(base)
}

fn invalid(spec: &str, reason: &str) -> InstallError {
    InstallError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_url() {
        let r = parse("https://gitlab.com/openscad-modules/breadboard.git").unwrap();
        assert_eq!(r.name, "breadboard");
        assert_eq!(r.url, "https://gitlab.com/openscad-modules/breadboard.git");
        assert_eq!(r.rev, "");
    }

    #[test]
    fn test_parses_url_with_selector() {
        let r = parse("https://gitlab.com/openscad-modules/breadboard.git#v2").unwrap();
        assert_eq!(r.name, "breadboard");
        assert_eq!(r.url, "https://gitlab.com/openscad-modules/breadboard.git");
        assert_eq!(r.rev, "v2");
    }

    #[test]
    fn test_selector_whitespace_is_trimmed() {
        let r = parse("https://host/group/mod.git# feature-branch ").unwrap();
        assert_eq!(r.rev, "feature-branch");
    }

    #[test]
    fn test_selector_keeps_inner_hash() {
        let r = parse("https://host/group/mod.git#a#b").unwrap();
        assert_eq!(r.url, "https://host/group/mod.git");
        assert_eq!(r.rev, "a#b");
    }

    #[test]
    fn test_name_without_archive_suffix() {
        let r = parse("https://host/group/gears").unwrap();
        assert_eq!(r.name, "gears");
    }

    #[test]
    fn test_trailing_slash_is_tolerated() {
        let r = parse("https://host/group/gears/").unwrap();
        assert_eq!(r.name, "gears");
    }

    #[test]
    fn test_query_string_does_not_leak_into_name() {
        let r = parse("https://host/group/mod.git?shallow=no#v1").unwrap();
        assert_eq!(r.name, "mod");
        assert_eq!(r.rev, "v1");
    }

    #[test]
    fn test_scp_style_remote() {
        let r = parse("git@gitlab.com:openscad-modules/breadboard.git#main").unwrap();
        assert_eq!(r.name, "breadboard");
        assert_eq!(r.url, "git@gitlab.com:openscad-modules/breadboard.git");
        assert_eq!(r.rev, "main");
    }

    #[test]
    fn test_local_path_remote() {
        let r = parse("/srv/repos/gears#abc1234").unwrap();
        assert_eq!(r.name, "gears");
        assert_eq!(r.url, "/srv/repos/gears");
        assert_eq!(r.rev, "abc1234");
    }

    #[test]
    fn test_rejects_url_without_path_segment() {
        let err = parse("https://gitlab.com").unwrap_err();
        assert!(matches!(err, InstallError::InvalidSpec { .. }));
    }

    #[test]
    fn test_rejects_bare_selector() {
        let err = parse("#v1").unwrap_err();
        assert!(matches!(err, InstallError::InvalidSpec { .. }));
    }

    #[test]
    fn test_rejects_name_that_is_only_suffix() {
        let err = parse("https://host/group/.git").unwrap_err();
        assert!(matches!(err, InstallError::InvalidSpec { .. }));
    }
}
