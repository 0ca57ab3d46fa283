//! Active session state, one JSON file per session in the shared common
//! directory so linked worktrees see the same sessions.

use entire_core::attribution::PromptAttribution;
use entire_core::{layout, session, textutil, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default strategy name.
pub const STRATEGY_MANUAL_COMMIT: &str = "manual-commit";

/// Persistent record of a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub agent_kind: String,
    pub first_prompt: String,
    pub description: String,
    pub start_time: String,
    pub strategy_name: String,
    /// Per-prompt ledger of human edits observed at prompt submission.
    #[serde(default)]
    pub current_prompt_attribution: Vec<PromptAttribution>,
    /// Parent session id; empty for top-level sessions.
    #[serde(default)]
    pub parent_id: String,
    /// Digest of the worktree at the last ledger capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_worktree_digest: Option<String>,
    /// Human lines already ledgered against the current snapshot; resets
    /// whenever a new snapshot is written. Prevents double counting when
    /// several prompts arrive without an intervening snapshot.
    #[serde(default)]
    pub ledgered_since_snapshot: u64,
    /// Last completed condensation step, for crash reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_condense_step: Option<String>,
    /// Shadow tip promoted by the last condensation; reclaimable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_shadow_tip: Option<String>,
}

impl SessionState {
    pub fn is_sub_session(&self) -> bool {
        !self.parent_id.is_empty()
    }

    pub fn next_prompt_index(&self) -> u32 {
        self.current_prompt_attribution
            .last()
            .map_or(1, |p| p.prompt_index + 1)
    }
}

/// File-per-session store under `<common-dir>/entire-sessions/`.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(common_dir: &Path) -> Self {
        Self {
            dir: layout::session_state_dir(common_dir),
        }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Open an existing session or create a fresh one. Resuming by the
    /// same id is idempotent: the original first prompt and start time
    /// are kept.
    pub fn create_or_resume(
        &self,
        session_id: &str,
        agent_kind: &str,
        first_prompt: &str,
        strategy: &str,
    ) -> Result<SessionState> {
        if let Some(existing) = self.get(session_id)? {
            return Ok(existing);
        }
        let state = SessionState {
            id: session_id.to_string(),
            agent_kind: agent_kind.to_string(),
            first_prompt: first_prompt.to_string(),
            description: textutil::description_from_prompt(first_prompt),
            start_time: session::now_rfc3339(),
            strategy_name: strategy.to_string(),
            current_prompt_attribution: Vec::new(),
            parent_id: String::new(),
            last_worktree_digest: None,
            ledgered_since_snapshot: 0,
            last_condense_step: None,
            promoted_shadow_tip: None,
        };
        self.save(&state)?;
        Ok(state)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.path(session_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(&state.id);
        let json = serde_json::to_string_pretty(state)?;
        // Atomic replace so readers never observe a torn state file.
        let tmp = self.dir.join(format!(".tmp_{}.json", state.id));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, session_id: &str) -> Result<()> {
        match std::fs::remove_file(self.path(session_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All live sessions, ordered by start time.
    pub fn list_active(&self) -> Result<Vec<SessionState>> {
        let mut sessions = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") || name.starts_with(".tmp_") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())?;
            match serde_json::from_str::<SessionState>(&content) {
                Ok(state) => sessions.push(state),
                Err(_) => continue, // stale or foreign file
            }
        }
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    /// The most recently started top-level session, if any.
    pub fn current(&self) -> Result<Option<SessionState>> {
        Ok(self
            .list_active()?
            .into_iter()
            .filter(|s| !s.is_sub_session())
            .next_back())
    }

    pub fn set_strategy(&self, session_id: &str, name: &str) -> Result<()> {
        if let Some(mut state) = self.get(session_id)? {
            state.strategy_name = name.to_string();
            self.save(&state)?;
        }
        Ok(())
    }

    /// Append one per-prompt ledger entry.
    pub fn append_prompt_attribution(
        &self,
        session_id: &str,
        entry: PromptAttribution,
    ) -> Result<()> {
        if let Some(mut state) = self.get(session_id)? {
            state.current_prompt_attribution.push(entry);
            self.save(&state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> (PathBuf, StateStore) {
        let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let tmp =
            std::env::temp_dir().join(format!("entire_state_test_{}_{n}", std::process::id()));
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let store = StateStore::new(&tmp);
        (tmp, store)
    }

    #[test]
    fn create_then_resume_is_idempotent() {
        let (tmp, store) = temp_store();
        let created = store
            .create_or_resume("2025-01-01-abc", "claudecode", "please fix the bug", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        assert_eq!(created.description, "Fix the bug");

        let resumed = store
            .create_or_resume("2025-01-01-abc", "claudecode", "a different prompt", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        assert_eq!(resumed.first_prompt, "please fix the bug");
        assert_eq!(resumed.start_time, created.start_time);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn get_missing_returns_none() {
        let (tmp, store) = temp_store();
        assert!(store.get("2025-01-01-none").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn list_active_sorted_by_start_time() {
        let (tmp, store) = temp_store();
        let mut a = store
            .create_or_resume("2025-01-01-a", "claudecode", "a", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        let mut b = store
            .create_or_resume("2025-01-01-b", "claudecode", "b", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        a.start_time = "2025-01-01T10:00:00Z".to_string();
        b.start_time = "2025-01-01T09:00:00Z".to_string();
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, "2025-01-01-b");
        assert_eq!(active[1].id, "2025-01-01-a");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn current_skips_sub_sessions() {
        let (tmp, store) = temp_store();
        let mut parent = store
            .create_or_resume("2025-01-01-parent", "claudecode", "p", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        parent.start_time = "2025-01-01T09:00:00Z".to_string();
        store.save(&parent).unwrap();
        let mut child = store
            .create_or_resume("2025-01-01-child", "claudecode", "c", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        child.parent_id = "2025-01-01-parent".to_string();
        child.start_time = "2025-01-01T10:00:00Z".to_string();
        store.save(&child).unwrap();

        let current = store.current().unwrap().unwrap();
        assert_eq!(current.id, "2025-01-01-parent");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn prompt_ledger_appends_in_order() {
        let (tmp, store) = temp_store();
        store
            .create_or_resume("2025-01-01-abc", "claudecode", "p", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        for i in 1..=3u32 {
            store
                .append_prompt_attribution(
                    "2025-01-01-abc",
                    PromptAttribution {
                        prompt_index: i,
                        files_touched: vec![],
                        lines_added_by_human: u64::from(i),
                    },
                )
                .unwrap();
        }
        let state = store.get("2025-01-01-abc").unwrap().unwrap();
        assert_eq!(state.current_prompt_attribution.len(), 3);
        assert_eq!(state.next_prompt_index(), 4);
        let total: u64 = state
            .current_prompt_attribution
            .iter()
            .map(|p| p.lines_added_by_human)
            .sum();
        assert_eq!(total, 6);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn set_strategy_updates_record() {
        let (tmp, store) = temp_store();
        store
            .create_or_resume("2025-01-01-abc", "claudecode", "p", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        store.set_strategy("2025-01-01-abc", "auto-commit").unwrap();
        let state = store.get("2025-01-01-abc").unwrap().unwrap();
        assert_eq!(state.strategy_name, "auto-commit");
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn remove_is_idempotent() {
        let (tmp, store) = temp_store();
        store
            .create_or_resume("2025-01-01-abc", "claudecode", "p", STRATEGY_MANUAL_COMMIT)
            .unwrap();
        store.remove("2025-01-01-abc").unwrap();
        store.remove("2025-01-01-abc").unwrap();
        assert!(store.get("2025-01-01-abc").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
