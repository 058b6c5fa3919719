//! Committing into bare repositories through a scratch clone

use std::fs;
use std::path::{Path, PathBuf};

use git2::ErrorCode;
use git2::Oid;
use git2::build::CheckoutBuilder;
use tracing::{debug, warn};

use crate::client::open;
use crate::{Error, GitClient, Result};

const REMOTE_NAME: &str = "origin";

/// Scratch working copy, removed from disk when dropped.
struct ScratchRepo {
    path: PathBuf,
}

impl Drop for ScratchRepo {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch repository"
            );
        }
    }
}

impl GitClient {
    /// Commit a file into the bare repository at `dir`.
    ///
    /// A scratch non-bare repository fetches the bare one as `origin`, the
    /// file is committed there and the initial branch is force-pushed back.
    /// A bare repository without history is a valid starting point. The
    /// scratch directory is removed before returning, whatever the outcome.
    pub fn commit_in_bare_repo(&self, dir: &Path, file_name: &str, contents: &str) -> Result<Oid> {
        let scratch = ScratchRepo {
            path: self.init_repository(false)?,
        };
        let repo = open(&scratch.path)?;

        let url = file_url(dir)?;
        let mut remote = repo.remote(REMOTE_NAME, &url)?;

        let branch = self.initial_branch();
        remote
            .fetch(
                &[format!("+refs/heads/*:refs/remotes/{REMOTE_NAME}/*")],
                None,
                None,
            )
            .map_err(|e| Error::PullFailed {
                message: format!("Fetch failed: {}", e.message()),
            })?;

        match repo.find_reference(&format!("refs/remotes/{REMOTE_NAME}/{branch}")) {
            Ok(reference) => {
                let commit = reference.peel_to_commit()?;
                repo.reference(
                    &format!("refs/heads/{branch}"),
                    commit.id(),
                    true,
                    &format!("pull: fast-forward to {}", commit.id()),
                )?;
                repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(remote = %url, "Remote repository is empty, nothing to pull");
            }
            Err(e) => {
                return Err(Error::PullFailed {
                    message: format!("Could not resolve fetched {branch}: {}", e.message()),
                });
            }
        }

        let oid = self.add_file_and_commit(&scratch.path, file_name, contents)?;

        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        remote
            .push(&[&refspec], None)
            .map_err(|e| Error::PushFailed {
                message: e.message().to_string(),
            })?;

        debug!(path = %dir.display(), file = %file_name, commit = %oid, "Pushed commit to bare repository");
        Ok(oid)
    }
}

fn file_url(dir: &Path) -> Result<String> {
    let absolute = fs::canonicalize(dir).map_err(|e| Error::io(dir, e))?;
    Ok(format!("file://{}", absolute.display()))
}
