//! Tests for GitClient working-copy operations

use std::fs;

use forge_git::{Author, Error, GitClient, TEMP_DIR_PREFIX};
use forge_test_utils::git::{clone_repository, files_in_tip_commit, has_staged_changes, read_file};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn client_in(root: &TempDir) -> GitClient {
    GitClient::new().with_temp_root(root.path())
}

fn dir_is_empty(root: &TempDir) -> bool {
    fs::read_dir(root.path()).unwrap().next().is_none()
}

// ============================================================================
// init_repository
// ============================================================================

#[test]
fn test_init_repository_creates_prefixed_dir() {
    let root = TempDir::new().unwrap();
    let dir = client_in(&root).init_repository(false).unwrap();

    assert!(dir.starts_with(root.path()));
    let name = dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(TEMP_DIR_PREFIX), "unexpected dir name {name}");

    let repo = git2::Repository::open(&dir).unwrap();
    assert!(!repo.is_bare());
}

#[test]
fn test_init_repository_bare() {
    let root = TempDir::new().unwrap();
    let dir = client_in(&root).init_repository(true).unwrap();

    let repo = git2::Repository::open(&dir).unwrap();
    assert!(repo.is_bare());
}

#[test]
fn test_init_repository_persists_author_config() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root).with_author(Author::new("Jane Roe", "jane@roe.org"));
    let dir = client.init_repository(false).unwrap();

    let repo = git2::Repository::open(&dir).unwrap();
    let config = repo.config().unwrap();
    assert_eq!(config.get_string("user.name").unwrap(), "Jane Roe");
    assert_eq!(config.get_string("user.email").unwrap(), "jane@roe.org");
}

// ============================================================================
// add_file_and_commit + get_refs
// ============================================================================

#[test]
fn test_commit_then_refs_points_master_at_commit() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    let oid = client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();
    let refs = client.get_refs(&dir).unwrap();

    assert_eq!(refs.get("refs/heads/master"), Some(&oid.to_string()));
    assert_eq!(refs.get("HEAD"), Some(&oid.to_string()));
    assert_eq!(read_file(&dir, "a.txt"), "hello");
}

#[test]
fn test_commit_uses_author_and_message() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    let oid = client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();

    let repo = git2::Repository::open(&dir).unwrap();
    let commit = repo.find_commit(oid).unwrap();
    assert_eq!(commit.message(), Some("adding a.txt"));
    assert_eq!(commit.author().name(), Some("John Doe"));
    assert_eq!(commit.author().email(), Some("john@doe.org"));
    assert_eq!(commit.parent_count(), 0);
}

#[test]
fn test_second_commit_has_parent() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    let first = client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();
    let second = client
        .add_file_and_commit(&dir, "nested/b.txt", "world")
        .unwrap();

    let repo = git2::Repository::open(&dir).unwrap();
    let commit = repo.find_commit(second).unwrap();
    assert_eq!(commit.parent_id(0).unwrap(), first);
    assert_eq!(read_file(&dir, "nested/b.txt"), "world");
}

#[test]
fn test_refs_of_empty_repository_are_empty() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    assert!(client.get_refs(&dir).unwrap().is_empty());
}

#[test]
fn test_open_missing_repository_fails() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let missing = root.path().join("missing");

    let err = client.add_file_and_commit(&missing, "a.txt", "x").unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "got {err:?}");

    let err = client.get_refs(&missing).unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "got {err:?}");
}

#[test]
fn test_commit_rejects_escaping_file_name() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    let err = client
        .add_file_and_commit(&dir, "../outside.txt", "x")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFileName { .. }), "got {err:?}");
    assert!(!dir.parent().unwrap().join("outside.txt").exists());
}

// ============================================================================
// Bare repositories
// ============================================================================

#[test]
fn test_commit_into_empty_bare_repository() {
    let repos = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let bare = client_in(&repos).init_repository(true).unwrap();
    let client = client_in(&scratch);

    let oid = client.add_file_and_commit(&bare, "a.txt", "hello").unwrap();

    let refs = client.get_refs(&bare).unwrap();
    assert_eq!(refs.get("refs/heads/master"), Some(&oid.to_string()));

    let clone = clone_repository(&bare);
    assert_eq!(read_file(clone.path(), "a.txt"), "hello");
    assert!(dir_is_empty(&scratch), "scratch clone was left behind");
}

#[test]
fn test_commit_into_bare_repository_with_history() {
    let repos = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let bare = client_in(&repos).init_repository(true).unwrap();
    let client = client_in(&scratch);

    let first = client.add_file_and_commit(&bare, "a.txt", "hello").unwrap();
    let second = client.add_file_and_commit(&bare, "b.txt", "world").unwrap();

    let repo = git2::Repository::open(&bare).unwrap();
    let tip = repo.find_commit(second).unwrap();
    assert_eq!(tip.parent_id(0).unwrap(), first);

    let clone = clone_repository(&bare);
    assert_eq!(read_file(clone.path(), "a.txt"), "hello");
    assert_eq!(read_file(clone.path(), "b.txt"), "world");
    assert_eq!(files_in_tip_commit(clone.path(), "master"), vec!["b.txt"]);
    assert!(dir_is_empty(&scratch));
}

#[test]
fn test_failed_bare_commit_removes_scratch_clone() {
    let repos = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let bare = client_in(&repos).init_repository(true).unwrap();
    let client = client_in(&scratch);

    let err = client.add_file_and_commit(&bare, "", "x").unwrap_err();
    assert!(matches!(err, Error::InvalidFileName { .. }), "got {err:?}");
    assert!(dir_is_empty(&scratch), "scratch clone was left behind");
    assert!(client.get_refs(&bare).unwrap().is_empty());
}

// ============================================================================
// Branches
// ============================================================================

#[test]
fn test_create_then_checkout_branch() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();
    let base = client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();

    client.create_branch(&dir, "feature").unwrap();
    client.checkout_branch(&dir, "feature").unwrap();

    let repo = git2::Repository::open(&dir).unwrap();
    let head = repo.head().unwrap();
    assert_eq!(head.shorthand(), Some("feature"));
    assert_eq!(head.target(), Some(base));
    assert!(!has_staged_changes(&dir));

    let config = repo.config().unwrap();
    assert_eq!(
        config.get_string("branch.feature.merge").unwrap(),
        "refs/heads/feature"
    );
}

#[test]
fn test_create_branch_twice_fails() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    client.create_branch(&dir, "feature").unwrap();
    let err = client.create_branch(&dir, "feature").unwrap_err();
    assert!(matches!(err, Error::BranchExists { .. }), "got {err:?}");
}

#[test]
fn test_checkout_existing_branch_switches_tree() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();
    client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();

    client.checkout_branch(&dir, "feature").unwrap();
    client.add_file_and_commit(&dir, "b.txt", "world").unwrap();

    client.checkout_branch(&dir, "master").unwrap();
    assert!(!dir.join("b.txt").exists());

    client.checkout_branch(&dir, "feature").unwrap();
    assert_eq!(read_file(&dir, "b.txt"), "world");
}

#[test]
fn test_checkout_on_unborn_head_is_orphan() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(false).unwrap();

    client.checkout_branch(&dir, "orphan").unwrap();
    let oid = client.add_file_and_commit(&dir, "a.txt", "hello").unwrap();

    let refs = client.get_refs(&dir).unwrap();
    assert_eq!(refs.get("refs/heads/orphan"), Some(&oid.to_string()));
    assert!(!refs.contains_key("refs/heads/master"));
}

#[test]
fn test_checkout_in_bare_repository_fails() {
    let root = TempDir::new().unwrap();
    let client = client_in(&root);
    let dir = client.init_repository(true).unwrap();

    let err = client.checkout_branch(&dir, "feature").unwrap_err();
    assert!(matches!(err, Error::NoWorkingTree { .. }), "got {err:?}");
}
