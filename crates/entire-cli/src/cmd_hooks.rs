//! Hook entrypoints.
//!
//! The four git hooks drive the commit-time state machine:
//! prepare-commit-msg injects a placeholder subject, commit-msg validates
//! the body and stamps the checkpoint trailer, post-commit condenses, and
//! pre-push forwards the metadata branch. The two agent hooks are the
//! observation points at prompt submission and agent stop; both read the
//! vendor hook payload as JSON on stdin.

use anyhow::Context;
use entire_agent::claudecode;
use entire_core::attribution::{self, file_content_from_bytes, FileSet, PromptAttribution};
use entire_core::{layout, textutil, Error};
use entire_store::condense::{stamp_commit_message, StampOutcome};
use entire_store::state::STRATEGY_MANUAL_COMMIT;
use entire_store::{Condenser, GitStore, SessionState, ShadowStore, StateLock, StateStore};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

/// Payload the agent hooks receive on stdin.
#[derive(Debug)]
struct HookPayload {
    session_id: String,
    transcript_path: String,
    prompt: String,
    cwd: String,
    parent_session_id: String,
}

/// Get a string field from the payload, trying snake_case first then
/// camelCase. Claude Code sends camelCase (e.g. `sessionId`); internal
/// tests use snake_case (e.g. `session_id`).
fn get_str(v: &serde_json::Value, snake_key: &str) -> String {
    if let Some(s) = v.get(snake_key).and_then(|x| x.as_str()) {
        return s.to_string();
    }
    let camel = snake_to_camel(snake_key);
    v.get(&camel)
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string()
}

fn snake_to_camel(s: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = false;
    for ch in s.chars() {
        if ch == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

fn parse_payload(input: &str) -> anyhow::Result<HookPayload> {
    let value: serde_json::Value =
        serde_json::from_str(input).context("malformed hook payload")?;
    Ok(HookPayload {
        session_id: get_str(&value, "session_id"),
        transcript_path: get_str(&value, "transcript_path"),
        prompt: get_str(&value, "prompt"),
        cwd: get_str(&value, "cwd"),
        parent_session_id: get_str(&value, "parent_session_id"),
    })
}

fn read_payload() -> anyhow::Result<HookPayload> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    parse_payload(&input)
}

fn open_store(payload_cwd: &str) -> anyhow::Result<GitStore> {
    let cwd = if payload_cwd.is_empty() {
        std::env::current_dir()?
    } else {
        PathBuf::from(payload_cwd)
    };
    Ok(GitStore::discover(&cwd)?)
}

fn worktree_file_set(store: &GitStore) -> anyhow::Result<FileSet> {
    Ok(store
        .worktree_bytes()?
        .into_iter()
        .map(|(path, bytes)| (path, file_content_from_bytes(&bytes)))
        .collect())
}

// ── Git hooks ───────────────────────────────────────────────────────

/// prepare-commit-msg: when the user gave no message, seed the editor
/// with a subject derived from the session's first prompt.
pub fn prepare_commit_msg(msg_file: &str, source: &str) -> anyhow::Result<()> {
    if !source.is_empty() {
        return Ok(());
    }
    let store = open_store("")?;
    let states = StateStore::new(&store.common_dir());
    let Some(session) = states.current()? else {
        return Ok(());
    };

    let existing = std::fs::read_to_string(msg_file).unwrap_or_default();
    let has_content = existing
        .lines()
        .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
    if has_content {
        return Ok(());
    }

    std::fs::write(msg_file, format!("{}\n{existing}", session.description))?;
    Ok(())
}

/// commit-msg: validate the body and stamp the checkpoint trailers
/// before the commit becomes visible to downstream hooks. A non-zero
/// exit aborts the commit.
pub fn commit_msg(msg_file: &str) -> anyhow::Result<()> {
    let store = open_store("")?;
    let states = StateStore::new(&store.common_dir());
    let Some(session) = states.current()? else {
        return Ok(());
    };

    // The hook only stamps commits on a base the session worked on.
    let Ok(head) = store.head_commit_id() else {
        return Ok(());
    };
    let shadow = ShadowStore::new(&store);
    if shadow.tip_for_base(&head).is_none() {
        return Ok(());
    }

    let raw = std::fs::read_to_string(msg_file)
        .with_context(|| format!("reading commit message file {msg_file}"))?;
    let message: String = raw
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .map(|l| format!("{l}\n"))
        .collect();

    match stamp_commit_message(&message, &session) {
        StampOutcome::Stamped { message, .. } => {
            let _lock = StateLock::acquire(&store.common_dir())?;
            std::fs::write(msg_file, message)?;
            Ok(())
        }
        StampOutcome::EmptyBody => {
            anyhow::bail!("aborting commit: empty commit message (session not recorded)")
        }
    }
}

/// post-commit: condense the accumulated session state behind the commit
/// that was just created.
pub fn post_commit() -> anyhow::Result<()> {
    let store = open_store("")?;
    let head = store.head_commit_id()?;
    let head_oid = store.resolve_commit(&head)?;

    let condenser = Condenser::new(&store);
    if let Some(metadata) = condenser.condense(head_oid)? {
        eprintln!(
            "[entire] checkpoint {} recorded (agent {:.1}%)",
            metadata.id, metadata.initial_attribution.agent_percentage
        );
    }
    Ok(())
}

/// pre-push: forward the metadata branch to the remote being pushed.
/// Best-effort; the push itself must not be blocked.
pub fn pre_push(remote: &str) -> anyhow::Result<()> {
    let store = open_store("")?;
    if store.branch_tip(layout::metadata_branch()).is_err() {
        return Ok(());
    }
    let refspec = format!(
        "refs/heads/{branch}:refs/heads/{branch}",
        branch = layout::metadata_branch()
    );
    let status = std::process::Command::new("git")
        .args(["push", "--no-verify", remote, &refspec])
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(_) | Err(_) => {
            eprintln!(
                "[entire] could not push {} to {remote}; push it manually with:",
                layout::metadata_branch()
            );
            eprintln!("  git push {remote} {refspec}");
        }
    }
    Ok(())
}

// ── Agent hooks ─────────────────────────────────────────────────────

/// prompt-submit: open or resume the session, reserve the per-base
/// shadow branch, and capture the per-prompt human-delta ledger. This is
/// the only moment pre-agent human edits are observable.
pub fn agent_prompt_submit() -> anyhow::Result<()> {
    let payload = read_payload()?;
    if payload.session_id.is_empty() {
        return Ok(());
    }
    let store = open_store(&payload.cwd)?;
    let session_id = layout::entire_session_id(&payload.session_id);

    // Pick up any condensation a crashed invocation left unfinished.
    let condenser = Condenser::new(&store);
    if let Err(e) = condenser.reconcile() {
        eprintln!("[entire] reconcile failed: {e}");
    }

    let states = StateStore::new(&store.common_dir());
    let mut session = states.create_or_resume(
        &session_id,
        "claudecode",
        &payload.prompt,
        STRATEGY_MANUAL_COMMIT,
    )?;
    if !payload.parent_session_id.is_empty() && session.parent_id.is_empty() {
        session.parent_id = layout::entire_session_id(&payload.parent_session_id);
        states.save(&session)?;
    }

    let Ok(base) = store.head_commit_id() else {
        eprintln!("[entire] repository has no commits yet; session not checkpointed");
        return Ok(());
    };

    let _lock = StateLock::acquire(&store.common_dir())?;
    let shadow = ShadowStore::new(&store);
    let branch = shadow.reserve(&base, &session_id, &session.strategy_name)?;

    capture_prompt_ledger(&store, &states, &shadow, &branch, &mut session)?;
    Ok(())
}

fn capture_prompt_ledger(
    store: &GitStore,
    states: &StateStore,
    shadow: &ShadowStore<'_>,
    branch: &str,
    session: &mut SessionState,
) -> anyhow::Result<()> {
    let worktree = worktree_file_set(store)?;
    let digest = attribution::file_set_digest(&worktree);
    if session.last_worktree_digest.as_deref() == Some(digest.as_str()) {
        return Ok(());
    }

    let snapshot = shadow.latest_file_set(branch)?;
    let (added, touched) = attribution::count_added_lines(&snapshot, &worktree);
    // Several prompts can arrive before the next snapshot; only the
    // delta beyond what was already ledgered counts.
    let fresh = added.saturating_sub(session.ledgered_since_snapshot);
    if fresh > 0 {
        let entry = PromptAttribution {
            prompt_index: session.next_prompt_index(),
            files_touched: touched,
            lines_added_by_human: fresh,
        };
        session.current_prompt_attribution.push(entry);
        session.ledgered_since_snapshot = added;
    }
    session.last_worktree_digest = Some(digest);
    states.save(session)?;
    Ok(())
}

/// stop: write a full-state temporary snapshot with the transcript
/// overlay. Sub-session payloads land under the root session's overlay
/// at `subsessions/<id>/…`.
pub fn agent_stop() -> anyhow::Result<()> {
    let payload = read_payload()?;
    if payload.session_id.is_empty() {
        return Ok(());
    }
    let store = open_store(&payload.cwd)?;
    let session_id = layout::entire_session_id(&payload.session_id);

    let transcript = match std::fs::read(&payload.transcript_path) {
        Ok(bytes) => bytes,
        Err(_) => {
            eprintln!(
                "[entire] transcript not found: {}; snapshot skipped",
                payload.transcript_path
            );
            return Ok(());
        }
    };
    let lines = claudecode::parse_transcript(&transcript);
    let last_prompt = claudecode::extract_last_user_prompt(&lines).unwrap_or_default();

    let states = StateStore::new(&store.common_dir());
    let mut session = states.create_or_resume(
        &session_id,
        "claudecode",
        &last_prompt,
        STRATEGY_MANUAL_COMMIT,
    )?;
    if !payload.parent_session_id.is_empty() && session.parent_id.is_empty() {
        session.parent_id = layout::entire_session_id(&payload.parent_session_id);
        states.save(&session)?;
    }

    let Ok(base) = store.head_commit_id() else {
        eprintln!("[entire] repository has no commits yet; snapshot skipped");
        return Ok(());
    };

    // A sub-session snapshots onto its root session's shadow branch.
    let (root_id, prefix) = resolve_root(&states, &session)?;

    let mut overlay: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let prompts = claudecode::extract_user_prompts(&lines);
    overlay.insert(format!("{prefix}full.jsonl"), transcript);
    overlay.insert(
        format!("{prefix}prompt.txt"),
        format!("{}\n", prompts.join("\n")).into_bytes(),
    );
    overlay.insert(
        format!("{prefix}context.md"),
        claudecode::render_context(&lines).into_bytes(),
    );

    let _lock = StateLock::acquire(&store.common_dir())?;
    let shadow = ShadowStore::new(&store);
    let branch = shadow.reserve(&base, &root_id, &session.strategy_name)?;
    let message = textutil::description_from_prompt(&last_prompt);
    shadow.write_snapshot(&branch, &root_id, &session.strategy_name, &overlay, &message)?;

    // Remember what the worktree looked like after the agent stopped, so
    // the next prompt submission only ledgers genuine human edits.
    session.last_worktree_digest = Some(attribution::file_set_digest(&worktree_file_set(&store)?));
    session.ledgered_since_snapshot = 0;
    states.save(&session)?;

    eprintln!("[entire] checkpoint saved for session {session_id}");
    Ok(())
}

/// Walk the parent chain to the root session; returns the root id and
/// the overlay path prefix for this session's files.
fn resolve_root(
    states: &StateStore,
    session: &SessionState,
) -> anyhow::Result<(String, String)> {
    let mut prefix = String::new();
    let mut current = session.clone();
    let mut hops = 0;
    while current.is_sub_session() {
        prefix = format!("subsessions/{}/{prefix}", current.id);
        hops += 1;
        if hops > 16 {
            return Err(Error::ShadowBranchCorrupt(format!(
                "session parent chain too deep at {}",
                current.id
            ))
            .into());
        }
        match states.get(&current.parent_id)? {
            Some(parent) => current = parent,
            None => break, // orphaned child; treat its parent as root
        }
    }
    let root_id = if current.is_sub_session() {
        current.parent_id
    } else {
        current.id
    };
    Ok((root_id, prefix))
}
