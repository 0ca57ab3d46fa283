//! Thin wrapper over the git object store.
//!
//! All tree construction goes through tree builders so the user's index
//! is never touched; reference updates are single atomic writes performed
//! after every object they point at already exists.

use entire_core::attribution::{file_content_from_bytes, FileSet};
use entire_core::{Error, Result};
use git2::{ObjectType, Oid, Repository, Signature, TreeWalkMode, TreeWalkResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fallback committer identity when the repository has none configured.
const FALLBACK_NAME: &str = "entire";
const FALLBACK_EMAIL: &str = "entire@localhost";

/// Checkpoint store backed by a git repository.
pub struct GitStore {
    repo: Repository,
}

/// Map a libgit2 error into the engine's error kind.
pub(crate) fn git_err(e: git2::Error) -> Error {
    Error::IOFailed(format!("git: {}", e.message()))
}

impl GitStore {
    /// Discover the repository containing `path`.
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).map_err(|_| Error::NotARepository)?;
        Ok(Self { repo })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|_| Error::NotARepository)?;
        Ok(Self { repo })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// The repository working directory. Bare repositories are rejected.
    pub fn workdir(&self) -> Result<&Path> {
        self.repo.workdir().ok_or(Error::NotARepository)
    }

    /// The shared common directory, visible from every linked worktree.
    pub fn common_dir(&self) -> PathBuf {
        self.repo.commondir().to_path_buf()
    }

    // ── References ──────────────────────────────────────────────────

    pub fn head_commit_id(&self) -> Result<String> {
        let head = self.repo.head().map_err(git_err)?;
        let commit = head.peel_to_commit().map_err(git_err)?;
        Ok(commit.id().to_string())
    }

    /// The short name of the currently checked-out branch, if HEAD is a
    /// branch.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = self.repo.head().map_err(git_err)?;
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/heads/{name}"))
            .is_ok()
    }

    pub fn branch_tip(&self, name: &str) -> Result<Oid> {
        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{name}"))
            .map_err(|_| Error::RefNotFound(name.to_string()))?;
        reference
            .peel_to_commit()
            .map(|c| c.id())
            .map_err(git_err)
    }

    pub fn remote_branch_tip(&self, remote: &str, name: &str) -> Option<Oid> {
        self.repo
            .find_reference(&format!("refs/remotes/{remote}/{name}"))
            .ok()
            .and_then(|r| r.peel_to_commit().ok())
            .map(|c| c.id())
    }

    /// All local branch names.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(git_err)?;
        for branch in branches {
            let (branch, _) = branch.map_err(git_err)?;
            if let Some(name) = branch.name().map_err(git_err)? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .map_err(|_| Error::RefNotFound(name.to_string()))?;
        branch.delete().map_err(git_err)
    }

    // ── Commits ─────────────────────────────────────────────────────

    pub fn commit_message(&self, oid: Oid) -> Result<String> {
        let commit = self.repo.find_commit(oid).map_err(git_err)?;
        Ok(commit.message().unwrap_or("").to_string())
    }

    pub fn commit_time_rfc3339(&self, oid: Oid) -> Result<String> {
        let commit = self.repo.find_commit(oid).map_err(git_err)?;
        let when = commit.committer().when();
        let ts = time::OffsetDateTime::from_unix_timestamp(when.seconds())
            .map_err(|e| Error::IOFailed(format!("bad commit timestamp: {e}")))?;
        ts.format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| Error::IOFailed(format!("timestamp format: {e}")))
    }

    pub fn first_parent(&self, oid: Oid) -> Result<Option<Oid>> {
        let commit = self.repo.find_commit(oid).map_err(git_err)?;
        Ok(commit.parent_id(0).ok())
    }

    /// Resolve a revision string (e.g. an abbreviated commit id) to a
    /// commit oid.
    pub fn resolve_commit(&self, rev: &str) -> Result<Oid> {
        let obj = self
            .repo
            .revparse_single(rev)
            .map_err(|_| Error::RefNotFound(rev.to_string()))?;
        obj.peel_to_commit().map(|c| c.id()).map_err(git_err)
    }

    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Oid> {
        self.repo.merge_base(a, b).map_err(git_err)
    }

    /// Number of commits reachable from `to` but not from `from`
    /// (first-parent walk from `to`, stopping at `from`).
    pub fn count_commits_between(&self, from: Oid, to: Oid) -> Result<usize> {
        let mut walk = self.repo.revwalk().map_err(git_err)?;
        walk.push(to).map_err(git_err)?;
        walk.hide(from).map_err(git_err)?;
        Ok(walk.count())
    }

    /// The committer signature, falling back to a fixed identity when the
    /// repository has no user configured.
    pub fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Signature::now(FALLBACK_NAME, FALLBACK_EMAIL).map_err(git_err),
        }
    }

    /// Create a commit on `refs/heads/<branch>` without touching HEAD or
    /// the working tree. The commit object is written first; the
    /// reference update is the final write.
    pub fn commit_on_branch(
        &self,
        branch: &str,
        parents: &[Oid],
        tree: Oid,
        message: &str,
    ) -> Result<Oid> {
        let tree = self.repo.find_tree(tree).map_err(git_err)?;
        let parent_commits: Vec<git2::Commit> = parents
            .iter()
            .map(|&p| self.repo.find_commit(p).map_err(git_err))
            .collect::<Result<_>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
            .map_err(git_err)?;
        let subject = message.lines().next().unwrap_or("commit");
        self.repo
            .reference(&format!("refs/heads/{branch}"), oid, true, subject)
            .map_err(git_err)?;
        Ok(oid)
    }

    // ── Trees ───────────────────────────────────────────────────────

    pub fn commit_tree(&self, oid: Oid) -> Result<git2::Tree<'_>> {
        let commit = self.repo.find_commit(oid).map_err(git_err)?;
        commit.tree().map_err(git_err)
    }

    /// Flatten a tree to `path -> raw bytes`, optionally restricted to
    /// paths under `prefix`.
    pub fn tree_bytes(
        &self,
        tree: &git2::Tree<'_>,
        prefix: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut files = BTreeMap::new();
        let mut walk_err = None;
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            let path = format!("{dir}{}", entry.name().unwrap_or(""));
            if let Some(prefix) = prefix {
                if path != prefix && !path.starts_with(&format!("{prefix}/")) {
                    return TreeWalkResult::Ok;
                }
            }
            match self.repo.find_blob(entry.id()) {
                Ok(blob) => {
                    files.insert(path, blob.content().to_vec());
                    TreeWalkResult::Ok
                }
                Err(e) => {
                    walk_err = Some(git_err(e));
                    TreeWalkResult::Abort
                }
            }
        })
        .map_err(git_err)?;
        if let Some(e) = walk_err {
            return Err(e);
        }
        Ok(files)
    }

    /// Flatten a tree to the attribution engine's file-set form, skipping
    /// paths under `exclude_prefix` (the snapshot overlay).
    pub fn tree_file_set(
        &self,
        tree: &git2::Tree<'_>,
        exclude_prefix: Option<&str>,
    ) -> Result<FileSet> {
        let bytes = self.tree_bytes(tree, None)?;
        let mut set = FileSet::new();
        for (path, content) in bytes {
            if let Some(prefix) = exclude_prefix {
                if path.starts_with(&format!("{prefix}/")) {
                    continue;
                }
            }
            set.insert(path, file_content_from_bytes(&content));
        }
        Ok(set)
    }

    /// Read a single file from a tree, if present.
    pub fn tree_file(&self, tree: &git2::Tree<'_>, path: &str) -> Result<Option<Vec<u8>>> {
        match tree.get_path(Path::new(path)) {
            Ok(entry) => {
                let blob = self.repo.find_blob(entry.id()).map_err(git_err)?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(git_err(e)),
        }
    }

    /// Flatten the working tree to `path -> raw bytes`, skipping `.git`
    /// and everything the repository's ignore rules exclude.
    pub fn worktree_bytes(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let root = self.workdir()?.to_path_buf();
        let mut files = BTreeMap::new();
        self.collect_worktree(&root, &root, &mut files)?;
        Ok(files)
    }

    fn collect_worktree(
        &self,
        root: &Path,
        dir: &Path,
        files: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .map_err(|_| Error::IOFailed("path outside worktree".to_string()))?;
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if rel_str == ".git" || rel_str.starts_with(".git/") {
                continue;
            }
            if self.repo.is_path_ignored(rel).unwrap_or(false) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect_worktree(root, &path, files)?;
            } else if file_type.is_file() {
                files.insert(rel_str, std::fs::read(&path)?);
            }
            // Symlinks and other special entries are not snapshotted.
        }
        Ok(())
    }

    /// Build a tree object from a flat `path -> bytes` map, writing blob
    /// and tree objects as needed. Does not touch the index.
    pub fn build_tree(&self, files: &BTreeMap<String, Vec<u8>>) -> Result<Oid> {
        let mut updates = Vec::with_capacity(files.len());
        for (path, content) in files {
            let blob = self.repo.blob(content).map_err(git_err)?;
            updates.push((path.clone(), blob));
        }
        self.build_tree_level(None, &updates)
    }

    /// Overlay `files` onto an existing base tree, replacing entries at
    /// the same paths and keeping everything else.
    pub fn build_tree_over(
        &self,
        base: &git2::Tree<'_>,
        files: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Oid> {
        let mut updates = Vec::with_capacity(files.len());
        for (path, content) in files {
            let blob = self.repo.blob(content).map_err(git_err)?;
            updates.push((path.clone(), blob));
        }
        self.build_tree_level(Some(base), &updates)
    }

    fn build_tree_level(
        &self,
        base: Option<&git2::Tree<'_>>,
        updates: &[(String, Oid)],
    ) -> Result<Oid> {
        let mut direct: Vec<(&str, Oid)> = Vec::new();
        let mut by_prefix: BTreeMap<&str, Vec<(String, Oid)>> = BTreeMap::new();

        for (path, oid) in updates {
            match path.split_once('/') {
                Some((prefix, rest)) => by_prefix
                    .entry(prefix)
                    .or_default()
                    .push((rest.to_string(), *oid)),
                None => direct.push((path.as_str(), *oid)),
            }
        }

        let mut builder = self.repo.treebuilder(base).map_err(git_err)?;
        for (name, oid) in &direct {
            builder.insert(name, *oid, 0o100_644).map_err(git_err)?;
        }
        for (prefix, sub_updates) in &by_prefix {
            let sub_tree = base
                .and_then(|t| t.get_name(prefix))
                .filter(|e| e.kind() == Some(ObjectType::Tree))
                .and_then(|e| self.repo.find_tree(e.id()).ok());
            let sub_oid = self.build_tree_level(sub_tree.as_ref(), sub_updates)?;
            builder.insert(prefix, sub_oid, 0o040_000).map_err(git_err)?;
        }
        builder.write().map_err(git_err)
    }

    /// The empty tree.
    pub fn empty_tree(&self) -> Result<Oid> {
        let builder = self.repo.treebuilder(None).map_err(git_err)?;
        builder.write().map_err(git_err)
    }

    // ── Worktree status ─────────────────────────────────────────────

    /// Whether the working tree is clean (no modified, staged, or
    /// untracked files).
    pub fn is_worktree_clean(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts)).map_err(git_err)?;
        Ok(statuses.is_empty())
    }
}
