//! Working-copy operations on throwaway repositories

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, ConfigLevel, ErrorCode, Oid, Reference, Repository,
    RepositoryInitOptions, Signature,
};
use tracing::debug;

use crate::{Error, Result};

/// Prefix of every directory created by [`GitClient::init_repository`].
pub const TEMP_DIR_PREFIX: &str = "git-test-";

const DEFAULT_AUTHOR_NAME: &str = "John Doe";
const DEFAULT_AUTHOR_EMAIL: &str = "john@doe.org";
const DEFAULT_INITIAL_BRANCH: &str = "master";

/// Identity used for every commit the client creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL)
    }
}

/// Stateless git helper.
///
/// Holds only defaults (author, initial branch, temp root); every operation
/// opens the repository at the directory it is given.
#[derive(Debug, Clone)]
pub struct GitClient {
    author: Author,
    initial_branch: String,
    temp_root: Option<PathBuf>,
}

impl Default for GitClient {
    fn default() -> Self {
        Self {
            author: Author::default(),
            initial_branch: DEFAULT_INITIAL_BRANCH.to_string(),
            temp_root: None,
        }
    }
}

impl GitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn with_initial_branch(mut self, branch: impl Into<String>) -> Self {
        self.initial_branch = branch.into();
        self
    }

    /// Create temporary repositories under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn initial_branch(&self) -> &str {
        &self.initial_branch
    }

    /// Initialise a repository in a fresh `git-test-*` directory.
    ///
    /// The author identity is written to the repository's local config. The
    /// caller owns the returned directory and is responsible for removing it.
    pub fn init_repository(&self, bare: bool) -> Result<PathBuf> {
        let temp_root = self.temp_root.clone().unwrap_or_else(std::env::temp_dir);
        let temp = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&temp_root)
            .map_err(|e| Error::io(&temp_root, e))?;

        let mut opts = RepositoryInitOptions::new();
        opts.bare(bare).initial_head(&self.initial_branch);

        let repo = Repository::init_opts(temp.path(), &opts).map_err(|e| Error::Init {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

        let mut config = repo.config()?.open_level(ConfigLevel::Local)?;
        config.set_str("user.name", &self.author.name)?;
        config.set_str("user.email", &self.author.email)?;

        let path = temp.keep();
        debug!(path = %path.display(), bare, "Initialised repository");
        Ok(path)
    }

    /// Write `file_name` with `contents` and commit it as `adding <file_name>`.
    ///
    /// Bare repositories are committed to through a scratch clone, see
    /// [`GitClient::commit_in_bare_repo`]. Returns the id of the new commit.
    pub fn add_file_and_commit(&self, dir: &Path, file_name: &str, contents: &str) -> Result<Oid> {
        let repo = open(dir)?;
        if repo.is_bare() {
            return self.commit_in_bare_repo(dir, file_name, contents);
        }

        let relative = validate_file_name(file_name)?;
        let workdir = repo.workdir().ok_or_else(|| Error::NoWorkingTree {
            path: dir.to_path_buf(),
        })?;

        let target = workdir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&target, contents).map_err(|e| Error::io(&target, e))?;

        let stage = |e: git2::Error| Error::Stage {
            file: file_name.to_string(),
            source: e,
        };
        let mut index = repo.index().map_err(stage)?;
        index.add_path(&relative).map_err(stage)?;
        index.write().map_err(stage)?;
        let tree_id = index.write_tree().map_err(stage)?;

        let commit = |e: git2::Error| Error::Commit {
            file: file_name.to_string(),
            source: e,
        };
        let tree = repo.find_tree(tree_id).map_err(commit)?;
        let signature = Signature::now(&self.author.name, &self.author.email).map_err(commit)?;
        let parent = head_commit(&repo).map_err(commit)?;
        let parents: Vec<&Commit> = parent.iter().collect();

        let oid = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("adding {file_name}"),
                &tree,
                &parents,
            )
            .map_err(commit)?;

        debug!(path = %dir.display(), file = %file_name, commit = %oid, "Committed file");
        Ok(oid)
    }

    /// Map every reference name to the hash it resolves to.
    ///
    /// Includes `HEAD` once it points at a commit. Symbolic references are
    /// resolved; references that cannot be resolved are skipped.
    pub fn get_refs(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let repo = open(dir)?;
        let mut refs = BTreeMap::new();

        for reference in repo.references()? {
            let reference = reference?;
            if let Some((name, oid)) = resolved_target(&reference) {
                refs.insert(name, oid.to_string());
            }
        }

        if let Ok(head) = repo.head()
            && let Some(oid) = head.target()
        {
            refs.insert("HEAD".to_string(), oid.to_string());
        }

        Ok(refs)
    }

    /// Record branch `name` in the repository config, merging from
    /// `refs/heads/<name>`.
    ///
    /// Only the configuration entry is written; the branch ref itself is
    /// created by [`GitClient::checkout_branch`].
    pub fn create_branch(&self, dir: &Path, name: &str) -> Result<()> {
        let refname = branch_refname(name)?;
        let repo = open(dir)?;
        let mut config = repo.config()?.open_level(ConfigLevel::Local)?;

        let key = format!("branch.{name}.merge");
        if config.get_string(&key).is_ok() {
            return Err(Error::BranchExists {
                name: name.to_string(),
            });
        }
        config.set_str(&key, &refname)?;

        debug!(path = %dir.display(), branch = %name, "Created branch record");
        Ok(())
    }

    /// Check out branch `name`, creating it at the current HEAD commit if it
    /// does not exist yet.
    ///
    /// On an unborn HEAD the checkout is orphan-style: HEAD is pointed at the
    /// (still unborn) branch. Local changes are never overwritten.
    pub fn checkout_branch(&self, dir: &Path, name: &str) -> Result<()> {
        let refname = branch_refname(name)?;
        let repo = open(dir)?;
        if repo.is_bare() {
            return Err(Error::NoWorkingTree {
                path: dir.to_path_buf(),
            });
        }

        let target = match repo.find_branch(name, BranchType::Local) {
            Ok(branch) => Some(branch.get().peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::NotFound => match head_commit(&repo)? {
                Some(commit) => {
                    repo.branch(name, &commit, false)?;
                    Some(commit)
                }
                None => None,
            },
            Err(e) => return Err(e.into()),
        };

        if let Some(commit) = &target {
            let mut checkout = CheckoutBuilder::new();
            checkout.safe();
            repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        }
        repo.set_head(&refname)?;

        debug!(
            path = %dir.display(),
            branch = %name,
            orphan = target.is_none(),
            "Checked out branch"
        );
        Ok(())
    }
}

pub(crate) fn open(dir: &Path) -> Result<Repository> {
    Repository::open(dir).map_err(|e| Error::Open {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// The commit HEAD points at, or `None` while HEAD is unborn.
fn head_commit(repo: &Repository) -> std::result::Result<Option<Commit<'_>>, git2::Error> {
    match repo.head() {
        Ok(head) => head.peel_to_commit().map(Some),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn resolved_target(reference: &Reference<'_>) -> Option<(String, Oid)> {
    let name = reference.name()?.to_string();
    let resolved = reference.resolve().ok()?;
    Some((name, resolved.target()?))
}

fn branch_refname(name: &str) -> Result<String> {
    let refname = format!("refs/heads/{name}");
    if name.is_empty() || !Reference::is_valid_name(&refname) {
        return Err(Error::InvalidBranchName {
            name: name.to_string(),
        });
    }
    Ok(refname)
}

/// A file name must be a non-empty relative path that stays inside the
/// working tree.
fn validate_file_name(file_name: &str) -> Result<PathBuf> {
    let path = Path::new(file_name);
    let valid = !file_name.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !valid {
        return Err(Error::InvalidFileName {
            name: file_name.to_string(),
        });
    }
    Ok(path.to_path_buf())
}
