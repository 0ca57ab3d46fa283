//! Condensation: promote accumulated temporary state into a single
//! committed record when the user commits.
//!
//! The commit-msg hook validates the message and stamps the checkpoint
//! trailer before the commit becomes visible; the post-commit hook reads
//! the trailer back and writes the committed record. A crash between the
//! two leaves a stamped commit without a record, which `reconcile` picks
//! up on the next session activity.

use crate::lock::StateLock;
use crate::repo::GitStore;
use crate::sessions::{CommittedMetadata, CommittedRecord, SessionsStore};
use crate::shadow::ShadowStore;
use crate::state::{SessionState, StateStore};
use entire_core::attribution::{self, FileSet};
use entire_core::{id, layout, trailer, Error, Result};
use git2::Oid;
use std::collections::BTreeMap;

/// Condensation protocol steps, recorded in session state as they
/// complete so a crashed run can be reconciled.
pub const STEP_GATHER: &str = "gather-overlay";
pub const STEP_ATTRIBUTION: &str = "attribution";
pub const STEP_RECORD: &str = "write-record";
pub const STEP_PROMOTE: &str = "promote-shadow";

/// Result of stamping a commit message in the commit-msg hook.
pub enum StampOutcome {
    /// The rewritten message and the checkpoint id it carries.
    Stamped {
        message: String,
        checkpoint_id: String,
    },
    /// The body was empty after trailer stripping; the commit must be
    /// aborted so empty sessions are never recorded.
    EmptyBody,
}

/// Rewrite a commit message to carry the checkpoint trailers.
///
/// Reuses an already-present checkpoint id (amends and hook re-runs stay
/// idempotent), otherwise allocates a fresh one. Session and strategy
/// trailers are added when absent. Emission order is lexicographic.
pub fn stamp_commit_message(message: &str, session: &SessionState) -> StampOutcome {
    let body = trailer::strip_trailers(message);
    if body.trim().is_empty() {
        return StampOutcome::EmptyBody;
    }

    let mut trailers = trailer::parse_trailers(message);
    let checkpoint_id = trailers
        .get(trailer::CHECKPOINT_KEY)
        .cloned()
        .unwrap_or_else(id::new_checkpoint_id);
    trailers.insert(trailer::CHECKPOINT_KEY.to_string(), checkpoint_id.clone());
    trailers
        .entry(trailer::SESSION_KEY.to_string())
        .or_insert_with(|| session.id.clone());
    trailers
        .entry(trailer::STRATEGY_KEY.to_string())
        .or_insert_with(|| session.strategy_name.clone());

    StampOutcome::Stamped {
        message: trailer::append_trailers(&body, &trailers),
        checkpoint_id,
    }
}

pub struct Condenser<'a> {
    store: &'a GitStore,
    states: StateStore,
}

impl<'a> Condenser<'a> {
    pub fn new(store: &'a GitStore) -> Self {
        let states = StateStore::new(&store.common_dir());
        Self { store, states }
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    fn record_step(&self, session: &mut Option<SessionState>, step: &'static str) {
        if let Some(state) = session {
            state.last_condense_step = Some(step.to_string());
            let _ = self.states.save(state);
        }
    }

    /// Condense the session state behind a freshly created user commit.
    ///
    /// Reads the `Entire-Checkpoint` trailer from the commit; commits
    /// without one are not session commits and are skipped. All failures
    /// surface as `CondensationFailed` naming the step; the metadata
    /// branch reference is the final write, so no partial record is ever
    /// observable.
    pub fn condense(&self, user_commit: Oid) -> Result<Option<CommittedMetadata>> {
        let message = self.store.commit_message(user_commit)?;
        let Some(checkpoint_id) = trailer::parse_checkpoint(&message) else {
            return Ok(None);
        };
        let session_id = trailer::parse_session(&message).unwrap_or_default();

        let _lock = StateLock::acquire(&self.store.common_dir())?;
        let mut session = self.states.get(&session_id)?;

        // Step 1-2: locate the shadow branch and gather the overlay.
        let base = self
            .store
            .first_parent(user_commit)
            .map_err(|e| step_failed(STEP_GATHER, &e))?
            .ok_or_else(|| Error::CondensationFailed {
                step: STEP_GATHER,
                reason: "user commit has no parent to use as base".to_string(),
            })?;
        let shadow = ShadowStore::new(self.store);
        let shadow_branch = layout::shadow_branch_for(&base.to_string());
        let (overlay, shadow_set, shadow_tip) = self
            .gather(&shadow, &shadow_branch, &session_id, base)
            .map_err(|e| step_failed(STEP_GATHER, &e))?;
        self.record_step(&mut session, STEP_GATHER);

        // Step 3: attribution over (base, shadow, user) plus the ledger.
        let overlay_root = layout::OVERLAY_ROOT;
        let base_set = self
            .store
            .commit_tree(base)
            .and_then(|t| self.store.tree_file_set(&t, Some(overlay_root)))
            .map_err(|e| step_failed(STEP_ATTRIBUTION, &e))?;
        let user_set = self
            .store
            .commit_tree(user_commit)
            .and_then(|t| self.store.tree_file_set(&t, Some(overlay_root)))
            .map_err(|e| step_failed(STEP_ATTRIBUTION, &e))?;
        let ledger = session
            .as_ref()
            .map(|s| s.current_prompt_attribution.clone())
            .unwrap_or_default();
        let attr = attribution::compute(&base_set, &shadow_set, &user_set, &ledger);
        self.record_step(&mut session, STEP_ATTRIBUTION);

        // Step 4: write the committed record. `created_at` is pinned to
        // the user commit's timestamp so re-runs are byte-identical.
        let metadata = CommittedMetadata {
            id: checkpoint_id,
            session_id: session_id.clone(),
            commit_ref: user_commit.to_string(),
            created_at: self
                .store
                .commit_time_rfc3339(user_commit)
                .map_err(|e| step_failed(STEP_RECORD, &e))?,
            agent_kind: session
                .as_ref()
                .map(|s| s.agent_kind.clone())
                .unwrap_or_else(|| "claudecode".to_string()),
            initial_attribution: attr,
        };
        let record = CommittedRecord {
            metadata: metadata.clone(),
            payload: overlay,
        };
        SessionsStore::new(self.store)
            .write(&record)
            .map_err(|e| step_failed(STEP_RECORD, &e))?;
        self.record_step(&mut session, STEP_RECORD);

        // Step 5: mark the shadow tip promoted and reset the ledger.
        if let Some(state) = &mut session {
            state.promoted_shadow_tip = shadow_tip.map(|t| t.to_string());
            state.current_prompt_attribution.clear();
            state.last_worktree_digest = None;
            state.ledgered_since_snapshot = 0;
            state.last_condense_step = None;
            self.states
                .save(state)
                .map_err(|e| step_failed(STEP_PROMOTE, &e))?;
        }

        Ok(Some(metadata))
    }

    fn gather(
        &self,
        shadow: &ShadowStore<'_>,
        shadow_branch: &str,
        session_id: &str,
        base: Oid,
    ) -> Result<(BTreeMap<String, Vec<u8>>, FileSet, Option<Oid>)> {
        if !self.store.branch_exists(shadow_branch) {
            // No snapshots were taken: the shadow state equals the base,
            // so everything in the commit is the human's.
            let base_set = self
                .store
                .commit_tree(base)
                .and_then(|t| self.store.tree_file_set(&t, Some(layout::OVERLAY_ROOT)))?;
            return Ok((BTreeMap::new(), base_set, None));
        }
        let snapshot = shadow.read_latest(shadow_branch)?;
        let tip = self.store.branch_tip(shadow_branch)?;
        let shadow_set = shadow.latest_file_set(shadow_branch)?;
        let mut overlay = snapshot.overlay;
        // A tip reserved by another session yields no overlay for us.
        if snapshot.session_id.as_deref() != Some(session_id) {
            overlay = BTreeMap::new();
        }
        Ok((overlay, shadow_set, Some(tip)))
    }

    /// Pick up a condensation the previous invocation did not finish:
    /// HEAD is stamped with a checkpoint trailer but the metadata branch
    /// has no record for it. Invoked on the next session activity.
    pub fn reconcile(&self) -> Result<Option<CommittedMetadata>> {
        let head = match self.store.head_commit_id() {
            Ok(id) => id,
            Err(_) => return Ok(None), // unborn HEAD
        };
        let head_oid = self.store.resolve_commit(&head)?;
        let message = self.store.commit_message(head_oid)?;
        let Some(checkpoint_id) = trailer::parse_checkpoint(&message) else {
            return Ok(None);
        };
        let sessions = SessionsStore::new(self.store);
        if sessions.read(&checkpoint_id).is_ok() {
            return Ok(None); // already condensed
        }
        self.condense(head_oid)
    }
}

fn step_failed(step: &'static str, error: &Error) -> Error {
    Error::CondensationFailed {
        step,
        reason: error.to_string(),
    }
}
