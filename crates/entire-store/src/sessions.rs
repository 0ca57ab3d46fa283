//! Committed checkpoint store: metadata-only records sharded by
//! checkpoint id on the `entire/sessions` branch.

use crate::repo::GitStore;
use entire_core::attribution::Attribution;
use entire_core::{layout, Error, Result};
use git2::Oid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `metadata.json` inside a checkpoint shard. Field names are stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedMetadata {
    pub id: String,
    pub session_id: String,
    pub commit_ref: String,
    pub created_at: String,
    pub agent_kind: String,
    pub initial_attribution: Attribution,
}

/// A full committed record: metadata plus the overlay payload copied
/// verbatim from the temporary snapshot (`full.jsonl`, `prompt.txt`,
/// `context.md`, `subsessions/<id>/…`).
pub struct CommittedRecord {
    pub metadata: CommittedMetadata,
    pub payload: BTreeMap<String, Vec<u8>>,
}

pub struct SessionsStore<'a> {
    store: &'a GitStore,
}

impl<'a> SessionsStore<'a> {
    pub fn new(store: &'a GitStore) -> Self {
        Self { store }
    }

    /// The metadata branch tip, creating the branch with an empty root
    /// commit on first use.
    pub fn ensure_branch(&self) -> Result<Oid> {
        let branch = layout::metadata_branch();
        if let Ok(tip) = self.store.branch_tip(branch) {
            return Ok(tip);
        }
        let empty = self.store.empty_tree()?;
        self.store
            .commit_on_branch(branch, &[], empty, "Initialize entire sessions\n")
    }

    /// Write a committed record as a single commit. Readers never observe
    /// a partial shard: the branch reference moves only after the whole
    /// tree exists. Re-writing identical content is a no-op.
    pub fn write(&self, record: &CommittedRecord) -> Result<()> {
        let tip = self.ensure_branch()?;
        let shard = layout::checkpoint_path(&record.metadata.id);

        let mut files = BTreeMap::new();
        let metadata_json = serde_json::to_vec_pretty(&record.metadata)?;
        files.insert(format!("{shard}/metadata.json"), metadata_json);
        for (rel, content) in &record.payload {
            files.insert(format!("{shard}/{rel}"), content.clone());
        }

        let tip_tree = self.store.commit_tree(tip)?;
        let tree = self.store.build_tree_over(&tip_tree, &files)?;
        if tree == tip_tree.id() {
            // Identical content already recorded.
            return Ok(());
        }

        let message = format!(
            "Record checkpoint {} for session {}\n",
            record.metadata.id, record.metadata.session_id
        );
        self.store
            .commit_on_branch(layout::metadata_branch(), &[tip], tree, &message)?;
        Ok(())
    }

    /// Read a record from the local metadata branch.
    pub fn read(&self, checkpoint_id: &str) -> Result<CommittedRecord> {
        let tip = self
            .store
            .branch_tip(layout::metadata_branch())
            .map_err(|_| Error::MetadataMissing(checkpoint_id.to_string()))?;
        let tree = self.store.commit_tree(tip)?;
        self.read_from_tree(&tree, checkpoint_id)
    }

    /// Read a record from an arbitrary metadata tree (e.g. the fetched
    /// `origin/entire/sessions`).
    pub fn read_from_tree(
        &self,
        tree: &git2::Tree<'_>,
        checkpoint_id: &str,
    ) -> Result<CommittedRecord> {
        let shard = layout::checkpoint_path(checkpoint_id);
        let metadata_bytes = self
            .store
            .tree_file(tree, &format!("{shard}/metadata.json"))?
            .ok_or_else(|| Error::MetadataMissing(checkpoint_id.to_string()))?;
        let metadata: CommittedMetadata = serde_json::from_slice(&metadata_bytes)?;

        let prefix = format!("{shard}/");
        let mut payload = BTreeMap::new();
        for (path, content) in self.store.tree_bytes(tree, Some(&shard))? {
            let rel = &path[prefix.len()..];
            if rel == "metadata.json" {
                continue;
            }
            payload.insert(rel.to_string(), content);
        }

        Ok(CommittedRecord { metadata, payload })
    }

    /// Read a record from the fetched remote copy of the metadata branch.
    pub fn read_remote(&self, remote: &str, checkpoint_id: &str) -> Result<CommittedRecord> {
        let tip = self
            .store
            .remote_branch_tip(remote, layout::metadata_branch())
            .ok_or_else(|| Error::MetadataMissing(checkpoint_id.to_string()))?;
        let tree = self.store.commit_tree(tip)?;
        self.read_from_tree(&tree, checkpoint_id)
    }

    /// All committed metadata records, ordered by checkpoint id.
    pub fn list_all(&self) -> Result<Vec<CommittedMetadata>> {
        let tip = match self.store.branch_tip(layout::metadata_branch()) {
            Ok(tip) => tip,
            Err(_) => return Ok(Vec::new()),
        };
        let tree = self.store.commit_tree(tip)?;
        let mut records = Vec::new();
        for (path, content) in self.store.tree_bytes(&tree, None)? {
            if !path.ends_with("/metadata.json") {
                continue;
            }
            match serde_json::from_slice::<CommittedMetadata>(&content) {
                Ok(metadata) => records.push(metadata),
                Err(_) => continue, // foreign or corrupt shard entry
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}
