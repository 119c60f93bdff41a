//! Source fetching from git remotes.
//!
//! A fetch is a full clone followed by a detached checkout of the pinned
//! revision. Revisions may be commit hashes (full or abbreviated), tags,
//! or branch names; an empty revision means the remote's default branch.

use crate::error::FetchError;
use git2::{ObjectType, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

/// Materializes one module source tree at a pinned revision.
///
/// The install engine only talks to this seam, so installs can be driven
/// against scripted fixtures in tests.
pub trait SourceFetcher {
    /// Place a checkout of `url` at revision `rev` into `dest`.
    ///
    /// `dest` must not exist yet. On failure nothing is left behind at
    /// `dest`, so a retry starts from a clean slate.
    fn fetch(&self, url: &str, rev: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Production fetcher backed by libgit2.
#[derive(Debug, Default)]
pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    fn fetch(&self, url: &str, rev: &str, dest: &Path) -> Result<(), FetchError> {
        if dest.exists() {
            return Err(FetchError::DestinationExists {
                dest: dest.to_path_buf(),
            });
        }

        let repo = clone_with_spinner(url, dest)?;

        if !rev.is_empty()
            && let Err(err) = pin_revision(&repo, url, rev)
        {
            // A failed pin must not leave a checkout at the wrong revision.
            drop(repo);
            let _ = fs::remove_dir_all(dest);
            return Err(err);
        }
        Ok(())
    }
}

fn clone_with_spinner(url: &str, dest: &Path) -> Result<Repository, FetchError> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷"),
    );
    pb.set_message(format!("Fetching {}...", url));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let cloned = Repository::clone(url, dest);
    pb.finish_and_clear();

    match cloned {
        Ok(repo) => Ok(repo),
        Err(err) => {
            // libgit2 can leave a partially written directory behind.
            if dest.exists() {
                let _ = fs::remove_dir_all(dest);
            }
            Err(FetchError::NotFound {
                url: url.to_string(),
                message: err.message().to_string(),
            })
        }
    }
}

fn pin_revision(repo: &Repository, url: &str, rev: &str) -> Result<(), FetchError> {
    let oid = resolve_revision(repo, rev).ok_or_else(|| FetchError::UnresolvableRevision {
        url: url.to_string(),
        rev: rev.to_string(),
    })?;

    checkout_detached(repo, oid).map_err(|err| FetchError::Checkout {
        url: url.to_string(),
        rev: rev.to_string(),
        message: err.message().to_string(),
    })
}

/// Revision ladder: anything rev-parse understands against the local clone
/// (hashes, tags, local branches), then the remote-tracking branch for
/// names that only exist on the remote.
fn resolve_revision(repo: &Repository, rev: &str) -> Option<git2::Oid> {
    let object = repo
        .revparse_single(rev)
        .or_else(|_| repo.revparse_single(&format!("origin/{}", rev)))
        .ok()?;
    let commit = object.peel(ObjectType::Commit).ok()?;
    Some(commit.id())
}

fn checkout_detached(repo: &Repository, oid: git2::Oid) -> Result<(), git2::Error> {
    repo.set_head_detached(oid)?;
    let obj = repo.find_object(oid, None)?;
    let mut checkout_opts = git2::build::CheckoutBuilder::new();
    checkout_opts.force();
    repo.checkout_tree(&obj, Some(&mut checkout_opts))
}
