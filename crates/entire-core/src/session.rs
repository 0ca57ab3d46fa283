//! Session and checkpoint data model.

use crate::attribution::Attribution;
use crate::textutil;
use serde::{Deserialize, Serialize};

/// Variant tag for checkpoints. Temporary checkpoints are full worktree
/// snapshots on a shadow branch; committed checkpoints are metadata
/// records decorating a user commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    #[default]
    Temporary,
    Committed,
}

/// A point-in-time record within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    pub created_at: String,
    pub kind: CheckpointKind,
    pub message: String,
    /// The user commit this checkpoint decorates. Committed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    /// Frozen attribution summary. Committed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
}

/// A unit of work driven by an external coding agent.
///
/// Sessions form a tree through `parent_id`/`children`; children are held
/// by id, never by back-reference, so the structure stays acyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable id of the form `YYYY-MM-DD-<agent-session-token>`.
    pub id: String,
    pub agent_kind: String,
    /// The first prompt of the session. Immutable once set.
    pub first_prompt: String,
    /// Display description derived from the first prompt.
    pub description: String,
    pub start_time: String,
    /// Empty for top-level sessions.
    #[serde(default)]
    pub parent_id: String,
    /// Tool invocation that spawned this sub-session, if any.
    #[serde(default)]
    pub tool_use_id: String,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    /// Ids of sub-sessions spawned from this session.
    #[serde(default)]
    pub children: Vec<String>,
}

impl Session {
    /// Create a top-level session. The description is derived from the
    /// first prompt; the start time is stamped now (UTC, RFC 3339).
    pub fn new(id: &str, agent_kind: &str, first_prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            agent_kind: agent_kind.to_string(),
            first_prompt: first_prompt.to_string(),
            description: textutil::description_from_prompt(first_prompt),
            start_time: now_rfc3339(),
            parent_id: String::new(),
            tool_use_id: String::new(),
            checkpoints: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A session is a sub-session iff its parent id is non-empty.
    pub fn is_sub_session(&self) -> bool {
        !self.parent_id.is_empty()
    }

    pub fn append_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    pub fn add_child(&mut self, child_id: &str) {
        if !self.children.iter().any(|c| c == child_id) {
            self.children.push(child_id.to_string());
        }
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_kind_defaults_to_temporary() {
        assert_eq!(CheckpointKind::default(), CheckpointKind::Temporary);
        assert_ne!(CheckpointKind::Temporary, CheckpointKind::Committed);
    }

    #[test]
    fn top_level_session_is_not_sub_session() {
        let s = Session::new("2025-01-01-abc", "claudecode", "fix the tests");
        assert!(!s.is_sub_session());
        assert_eq!(s.description, "Fix the tests");
    }

    #[test]
    fn parent_id_marks_sub_session() {
        let mut s = Session::new("2025-01-01-child", "claudecode", "subtask");
        s.parent_id = "2025-01-01-abc".to_string();
        s.tool_use_id = "toolu_abc".to_string();
        assert!(s.is_sub_session());
    }

    #[test]
    fn add_child_deduplicates() {
        let mut s = Session::new("2025-01-01-abc", "claudecode", "task");
        s.add_child("2025-01-01-child");
        s.add_child("2025-01-01-child");
        assert_eq!(s.children.len(), 1);
    }

    #[test]
    fn checkpoints_append_in_order() {
        let mut s = Session::new("2025-01-01-abc", "claudecode", "task");
        for i in 0..3 {
            s.append_checkpoint(Checkpoint {
                id: format!("{i:012}"),
                session_id: s.id.clone(),
                created_at: now_rfc3339(),
                kind: CheckpointKind::Temporary,
                message: String::new(),
                commit_ref: None,
                attribution: None,
            });
        }
        let ids: Vec<&str> = s.checkpoints.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["000000000000", "000000000001", "000000000002"]);
    }
}
