//! Shadow-branch janitor: enumerate and reclaim stale per-base shadow
//! branches.

use crate::repo::GitStore;
use entire_core::{layout, Result};

/// All local branches matching the shadow predicate. Returns an empty
/// vector (never nothing) when the repository has no shadow branches;
/// `entire/sessions` is never included.
pub fn list_shadow_branches(store: &GitStore) -> Result<Vec<String>> {
    let mut shadows: Vec<String> = store
        .list_branches()?
        .into_iter()
        .filter(|name| layout::is_shadow(name))
        .collect();
    shadows.sort();
    Ok(shadows)
}

/// Delete the given branches. Per-branch failures do not abort the
/// batch; both returned vectors are always non-null.
pub fn delete_shadow_branches(
    store: &GitStore,
    branches: &[String],
) -> Result<(Vec<String>, Vec<String>)> {
    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for branch in branches {
        match store.delete_branch(branch) {
            Ok(()) => deleted.push(branch.clone()),
            Err(_) => failed.push(branch.clone()),
        }
    }
    Ok((deleted, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn temp_repo_with_branches(branches: &[&str]) -> (tempfile::TempDir, GitStore) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(tmp.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.invalid").unwrap();
        drop(config);
        drop(repo);
        let store = GitStore::discover(tmp.path()).unwrap();

        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), b"# test\n".to_vec());
        let tree = store.build_tree(&files).unwrap();
        for branch in branches {
            store
                .commit_on_branch(branch, &[], tree, "initial commit\n")
                .unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn empty_repo_lists_empty_not_nothing() {
        let (_tmp, store) = temp_repo_with_branches(&["main"]);
        let shadows = list_shadow_branches(&store).unwrap();
        assert!(shadows.is_empty());
    }

    #[test]
    fn lists_exactly_the_shadow_branches() {
        let (_tmp, store) = temp_repo_with_branches(&[
            "entire/abc1234",
            "entire/def5678",
            "entire/sessions",
            "feature/foo",
            "main",
        ]);
        let shadows = list_shadow_branches(&store).unwrap();
        assert_eq!(shadows, vec!["entire/abc1234", "entire/def5678"]);
    }

    #[test]
    fn delete_existing_branches_succeeds() {
        let (_tmp, store) = temp_repo_with_branches(&["entire/abc1234", "entire/def5678", "main"]);
        let targets = vec!["entire/abc1234".to_string(), "entire/def5678".to_string()];
        let (deleted, failed) = delete_shadow_branches(&store, &targets).unwrap();
        assert_eq!(deleted, targets);
        assert!(failed.is_empty());
        assert!(list_shadow_branches(&store).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_branch_reports_failure() {
        let (_tmp, store) = temp_repo_with_branches(&["main"]);
        let targets = vec!["entire/doesnotexist".to_string()];
        let (deleted, failed) = delete_shadow_branches(&store, &targets).unwrap();
        assert!(deleted.is_empty());
        assert_eq!(failed, targets);
    }

    #[test]
    fn delete_empty_list_is_empty_result() {
        let (_tmp, store) = temp_repo_with_branches(&["main"]);
        let (deleted, failed) = delete_shadow_branches(&store, &[]).unwrap();
        assert!(deleted.is_empty());
        assert!(failed.is_empty());
    }
}
