//! Temporary checkpoint store: full-state snapshots on per-base shadow
//! branches (`entire/<short-hash>`).

use crate::repo::GitStore;
use entire_core::{layout, trailer, Error, Result};
use git2::Oid;
use std::collections::BTreeMap;

/// A snapshot read back from a shadow branch tip.
pub struct Snapshot {
    pub commit_id: String,
    pub session_id: Option<String>,
    /// Worktree files, overlay excluded.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Overlay files, keyed relative to `.entire/metadata/<session>/`.
    pub overlay: BTreeMap<String, Vec<u8>>,
}

/// Summary of one snapshot commit on a shadow branch.
pub struct SnapshotInfo {
    pub commit_id: String,
    pub message: String,
    pub created_at: String,
}

pub struct ShadowStore<'a> {
    store: &'a GitStore,
}

impl<'a> ShadowStore<'a> {
    pub fn new(store: &'a GitStore) -> Self {
        Self { store }
    }

    /// The session id recorded on the tip of a shadow branch, or `None`
    /// for legacy branches without the trailer.
    pub fn session_on_tip(&self, branch: &str) -> Result<Option<String>> {
        let tip = self.store.branch_tip(branch)?;
        let message = self.store.commit_message(tip)?;
        Ok(trailer::parse_session(&message))
    }

    /// Ensure the shadow branch for `base_commit_id` exists and belongs
    /// to `session_id`.
    ///
    /// Creates the branch with an initial empty commit (base tree, base
    /// parent) carrying session trailers. If the branch already exists
    /// and its tip names a different session, fails with
    /// `SessionIdConflict` — the branch trailer is authoritative even
    /// when session state files are gone. A tip without the trailer is
    /// legacy and does not conflict.
    pub fn reserve(
        &self,
        base_commit_id: &str,
        session_id: &str,
        strategy: &str,
    ) -> Result<String> {
        let branch = layout::shadow_branch_for(base_commit_id);

        if self.store.branch_exists(&branch) {
            if let Some(existing) = self.session_on_tip(&branch)? {
                if existing != session_id {
                    return Err(Error::SessionIdConflict {
                        branch,
                        existing,
                        requested: session_id.to_string(),
                    });
                }
            }
            return Ok(branch);
        }

        let base = self
            .store
            .resolve_commit(base_commit_id)
            .map_err(|_| Error::RefNotFound(base_commit_id.to_string()))?;
        let base_tree = self.store.commit_tree(base)?;

        let mut trailers = BTreeMap::new();
        trailers.insert(trailer::SESSION_KEY.to_string(), session_id.to_string());
        trailers.insert(trailer::STRATEGY_KEY.to_string(), strategy.to_string());
        let message = trailer::append_trailers(
            &format!("Reserve shadow branch for {}", &base_commit_id[..7.min(base_commit_id.len())]),
            &trailers,
        );

        self.store
            .commit_on_branch(&branch, &[base], base_tree.id(), &message)?;
        Ok(branch)
    }

    /// Write a full-state snapshot as a new tip of `branch`.
    ///
    /// The snapshot tree is the current worktree plus the session's
    /// metadata overlay. Overlay entries from the previous tip are
    /// carried forward and then overwritten by `overlay`, so sub-session
    /// writers and the top-level writer compose.
    pub fn write_snapshot(
        &self,
        branch: &str,
        session_id: &str,
        strategy: &str,
        overlay: &BTreeMap<String, Vec<u8>>,
        message: &str,
    ) -> Result<String> {
        let tip = self.store.branch_tip(branch)?;
        let overlay_root = layout::overlay_dir(session_id);

        let mut files = self.store.worktree_bytes()?;

        // Carry forward the previous overlay, then apply the new entries.
        let tip_tree = self.store.commit_tree(tip)?;
        let previous = self.store.tree_bytes(&tip_tree, Some(&overlay_root))?;
        files.extend(previous);
        for (rel, content) in overlay {
            files.insert(format!("{overlay_root}/{rel}"), content.clone());
        }

        let tree = self.store.build_tree(&files)?;

        let mut trailers = BTreeMap::new();
        trailers.insert(trailer::SESSION_KEY.to_string(), session_id.to_string());
        trailers.insert(trailer::STRATEGY_KEY.to_string(), strategy.to_string());
        let full_message = trailer::append_trailers(message, &trailers);

        let commit = self
            .store
            .commit_on_branch(branch, &[tip], tree, &full_message)?;
        Ok(commit.to_string())
    }

    /// Read the latest snapshot from a shadow branch tip.
    pub fn read_latest(&self, branch: &str) -> Result<Snapshot> {
        let tip = self.store.branch_tip(branch)?;
        let message = self.store.commit_message(tip)?;
        let session_id = trailer::parse_session(&message);

        let tree = self.store.commit_tree(tip)?;
        let all = self.store.tree_bytes(&tree, None)?;

        let mut files = BTreeMap::new();
        let mut overlay = BTreeMap::new();
        let overlay_prefix = session_id
            .as_deref()
            .map(|sid| format!("{}/", layout::overlay_dir(sid)));
        for (path, content) in all {
            match &overlay_prefix {
                Some(prefix) if path.starts_with(prefix) => {
                    overlay.insert(path[prefix.len()..].to_string(), content);
                }
                _ if path.starts_with(&format!("{}/", layout::OVERLAY_ROOT)) => {
                    // Overlay of another session on the same branch; not
                    // part of the worktree state.
                }
                _ => {
                    files.insert(path, content);
                }
            }
        }

        Ok(Snapshot {
            commit_id: tip.to_string(),
            session_id,
            files,
            overlay,
        })
    }

    /// The worktree portion of the latest snapshot tree (overlay paths
    /// excluded), as the attribution engine's file-set form.
    pub fn latest_file_set(
        &self,
        branch: &str,
    ) -> Result<entire_core::attribution::FileSet> {
        let tip = self.store.branch_tip(branch)?;
        let tree = self.store.commit_tree(tip)?;
        self.store.tree_file_set(&tree, Some(layout::OVERLAY_ROOT))
    }

    /// All snapshot commits on the shadow branch for `base`, tip first.
    /// The initial reserve commit is excluded.
    pub fn list_for_base(&self, base_commit_id: &str) -> Result<Vec<SnapshotInfo>> {
        let branch = layout::shadow_branch_for(base_commit_id);
        let tip = self.store.branch_tip(&branch)?;
        let base = self
            .store
            .resolve_commit(base_commit_id)
            .map_err(|_| Error::RefNotFound(base_commit_id.to_string()))?;

        let mut infos = Vec::new();
        let mut cursor = Some(tip);
        while let Some(oid) = cursor {
            if oid == base {
                break;
            }
            let message = self.store.commit_message(oid)?;
            let is_reserve = self.store.first_parent(oid)? == Some(base)
                && message.starts_with("Reserve shadow branch");
            if !is_reserve {
                infos.push(SnapshotInfo {
                    commit_id: oid.to_string(),
                    message: trailer::strip_trailers(&message),
                    created_at: self.store.commit_time_rfc3339(oid)?,
                });
            }
            cursor = self.store.first_parent(oid)?;
        }
        Ok(infos)
    }

    /// The tip oid of the shadow branch for `base`, if the branch exists.
    pub fn tip_for_base(&self, base_commit_id: &str) -> Option<Oid> {
        let branch = layout::shadow_branch_for(base_commit_id);
        self.store.branch_tip(&branch).ok()
    }
}
