//! Tests for GitClient

use crate::git::GitClient;
use git2::{Repository, Signature};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn setup_test_repo() -> (TempDir, GitClient) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path();

    let repo = Repository::init(repo_path).unwrap();

    // Create initial commit
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let tree_id = {
        let mut index = repo.index().unwrap();

        let test_file = repo_path.join("test.txt");
        fs::write(&test_file, "Hello, World!").unwrap();
        index.add_path(Path::new("test.txt")).unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    };

    let tree = repo.find_tree(tree_id).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
        .unwrap();

    let client = GitClient::new(repo_path).unwrap();
    (temp_dir, client)
}

fn commit_file(repo_path: &Path, name: &str, content: &str, message: &str) {
    let repo = Repository::open(repo_path).unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();

    fs::write(repo_path.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
        .unwrap();
}

#[test]
fn test_open_client() {
    let (_temp_dir, client) = setup_test_repo();
    assert!(client.repo_path().exists());
}

#[test]
fn test_create_branch_and_exists() {
    let (_temp_dir, client) = setup_test_repo();

    assert!(!client.branch_exists("feature-test"));
    let branch = client.create_branch("feature-test").unwrap();
    assert_eq!(branch.name, "feature-test");
    assert!(!branch.is_head);
    assert!(client.branch_exists("feature-test"));
}

#[test]
fn test_add_worktree_creates_branch_if_missing() {
    let (temp_dir, client) = setup_test_repo();

    let wt_path = temp_dir.path().join("wt").join("feature-a");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();

    let info = client.add_worktree("feature-a", &wt_path).unwrap();
    assert!(client.branch_exists("feature-a"));
    assert!(Path::new(&info.path).exists());
    assert_eq!(info.branch.as_deref(), Some("feature-a"));
}

#[test]
fn test_add_worktree_reuses_existing_branch() {
    let (temp_dir, client) = setup_test_repo();
    client.create_branch("feature-b").unwrap();

    let wt_path = temp_dir.path().join("wt").join("feature-b");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();

    let info = client.add_worktree("feature-b", &wt_path).unwrap();
    assert_eq!(info.branch.as_deref(), Some("feature-b"));
}

#[test]
fn test_slashed_branch_name_registers_flat() {
    let (temp_dir, client) = setup_test_repo();

    let wt_path = temp_dir.path().join("wt").join("1.1");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();

    let info = client.add_worktree("parallel/run/1.1", &wt_path).unwrap();
    assert_eq!(info.name, "parallel-run-1.1");
}

#[test]
fn test_list_and_remove_worktree() {
    let (temp_dir, client) = setup_test_repo();

    let wt_path = temp_dir.path().join("wt").join("listed");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
    client.add_worktree("listed", &wt_path).unwrap();

    let listed = client.list_worktrees().unwrap();
    assert_eq!(listed.len(), 1);

    client.remove_worktree(&wt_path).unwrap();
    assert!(client.list_worktrees().unwrap().is_empty());
}

#[test]
fn test_remove_unknown_worktree_errors() {
    let (temp_dir, client) = setup_test_repo();
    let missing = temp_dir.path().join("nope");
    assert!(client.remove_worktree(&missing).is_err());
}

#[test]
fn test_prune_orphaned_worktrees() {
    let (temp_dir, client) = setup_test_repo();

    let wt_path = temp_dir.path().join("wt").join("orphan");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
    client.add_worktree("orphan", &wt_path).unwrap();

    // Delete the directory out from under git
    fs::remove_dir_all(&wt_path).unwrap();

    let pruned = client.prune_orphaned_worktrees().unwrap();
    assert_eq!(pruned, 1);
    assert!(client.list_worktrees().unwrap().is_empty());
}

#[test]
fn test_is_ancestor_of_head() {
    let (temp_dir, client) = setup_test_repo();

    // A branch pointing at HEAD is merged by definition
    client.create_branch("at-head").unwrap();
    assert!(client.is_ancestor_of_head("at-head").unwrap());

    // After advancing HEAD, the branch is still an ancestor
    commit_file(temp_dir.path(), "more.txt", "more", "Second commit");
    assert!(client.is_ancestor_of_head("at-head").unwrap());
}

#[test]
fn test_unmerged_branch_is_not_ancestor() {
    let (temp_dir, client) = setup_test_repo();

    // Commit on a side branch via a worktree, leaving HEAD behind
    let wt_path = temp_dir.path().join("wt").join("side");
    fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
    client.add_worktree("side", &wt_path).unwrap();
    commit_file(&wt_path, "side.txt", "side", "Side commit");

    assert!(!client.is_ancestor_of_head("side").unwrap());
}

#[test]
fn test_is_path_ignored() {
    let (temp_dir, client) = setup_test_repo();

    fs::write(temp_dir.path().join(".gitignore"), ".worktrees/\n").unwrap();

    assert!(client.is_path_ignored(temp_dir.path().join(".worktrees").join("x")));
    assert!(!client.is_path_ignored(temp_dir.path().join("src")));
}
