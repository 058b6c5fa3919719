//! Helpers for asserting on repositories produced by the code under test.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Clone the repository at `source` (bare or not) into a fresh temp dir.
///
/// # Panics
/// Panics if the clone fails.
pub fn clone_repository(source: &Path) -> TempDir {
    let target = TempDir::new().unwrap_or_else(|e| panic!("clone_repository: no temp dir: {e}"));
    let url = format!("file://{}", source.display());
    git2::Repository::clone(&url, target.path()).unwrap_or_else(|e| {
        panic!(
            "clone_repository: failed to clone {} into {}: {e}",
            source.display(),
            target.path().display()
        )
    });
    target
}

/// Read a file from a working tree.
///
/// # Panics
/// Panics if the file cannot be read.
pub fn read_file(root: &Path, name: &str) -> String {
    let path = root.join(name);
    fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read_file: could not read {}: {e}", path.display()))
}

/// Names of the files touched by the commit at the tip of `branch`.
///
/// # Panics
/// Panics if the repository, branch or commit cannot be read.
pub fn files_in_tip_commit(repo_dir: &Path, branch: &str) -> Vec<String> {
    let repo = git2::Repository::open(repo_dir)
        .unwrap_or_else(|e| panic!("files_in_tip_commit: open {}: {e}", repo_dir.display()));
    let commit = repo
        .find_branch(branch, git2::BranchType::Local)
        .and_then(|b| b.get().peel_to_commit())
        .unwrap_or_else(|e| panic!("files_in_tip_commit: branch {branch}: {e}"));
    let tree = commit
        .tree()
        .unwrap_or_else(|e| panic!("files_in_tip_commit: tree: {e}"));
    let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
        .unwrap_or_else(|e| panic!("files_in_tip_commit: diff: {e}"));

    diff.deltas()
        .filter_map(|d| d.new_file().path().map(|p| p.to_string_lossy().into_owned()))
        .collect()
}

/// Whether the index of the repository at `repo_dir` differs from HEAD.
///
/// # Panics
/// Panics if the repository status cannot be read.
pub fn has_staged_changes(repo_dir: &Path) -> bool {
    let repo = git2::Repository::open(repo_dir)
        .unwrap_or_else(|e| panic!("has_staged_changes: open {}: {e}", repo_dir.display()));
    let statuses = repo
        .statuses(None)
        .unwrap_or_else(|e| panic!("has_staged_changes: status: {e}"));
    statuses.iter().any(|entry| {
        entry.status().intersects(
            git2::Status::INDEX_NEW
                | git2::Status::INDEX_MODIFIED
                | git2::Status::INDEX_DELETED
                | git2::Status::INDEX_RENAMED
                | git2::Status::INDEX_TYPECHANGE,
        )
    })
}
