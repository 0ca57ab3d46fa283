use anyhow::Context;
use entire_core::session::{Checkpoint, CheckpointKind, Session};
use entire_store::{GitStore, SessionsStore, ShadowStore, StateStore};

/// `entire status`: show the live sessions for this repository with their
/// temporary and committed checkpoints.
pub fn execute() -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = GitStore::discover(&cwd).context("not in a git repository")?;
    let states = StateStore::new(&store.common_dir());

    let active = states.list_active()?;
    if active.is_empty() {
        println!("No active sessions.");
        return Ok(());
    }

    let sessions = assemble_sessions(&store, &states)?;
    for session in &sessions {
        if session.is_sub_session() {
            continue; // shown under the parent
        }
        print_session(session, &sessions, 0);
    }
    Ok(())
}

/// Build the session tree: live state plus the checkpoints recorded for
/// each session on the shadow and metadata branches.
fn assemble_sessions(store: &GitStore, states: &StateStore) -> anyhow::Result<Vec<Session>> {
    let shadow = ShadowStore::new(store);
    let committed = SessionsStore::new(store).list_all()?;

    let mut sessions = Vec::new();
    let active = states.list_active()?;
    for state in &active {
        let mut session = Session::new(&state.id, &state.agent_kind, &state.first_prompt);
        session.description = state.description.clone();
        session.start_time = state.start_time.clone();
        session.parent_id = state.parent_id.clone();

        // Temporary checkpoints: snapshots on the current base's branch,
        // shown only for the session the branch belongs to.
        if let Ok(base) = store.head_commit_id() {
            let branch = entire_core::layout::shadow_branch_for(&base);
            let owns_branch = shadow
                .session_on_tip(&branch)
                .ok()
                .flatten()
                .is_some_and(|sid| sid == state.id);
            if owns_branch {
                if let Ok(infos) = shadow.list_for_base(&base) {
                    for info in infos.iter().rev() {
                        session.append_checkpoint(Checkpoint {
                            id: info.commit_id[..12.min(info.commit_id.len())].to_string(),
                            session_id: state.id.clone(),
                            created_at: info.created_at.clone(),
                            kind: CheckpointKind::Temporary,
                            message: info.message.clone(),
                            commit_ref: None,
                            attribution: None,
                        });
                    }
                }
            }
        }

        // Committed checkpoints recorded for this session.
        for metadata in committed.iter().filter(|m| m.session_id == state.id) {
            session.append_checkpoint(Checkpoint {
                id: metadata.id.clone(),
                session_id: metadata.session_id.clone(),
                created_at: metadata.created_at.clone(),
                kind: CheckpointKind::Committed,
                message: String::new(),
                commit_ref: Some(metadata.commit_ref.clone()),
                attribution: Some(metadata.initial_attribution.clone()),
            });
        }

        sessions.push(session);
    }

    // Link children to their parents.
    let links: Vec<(String, String)> = sessions
        .iter()
        .filter(|s| s.is_sub_session())
        .map(|s| (s.parent_id.clone(), s.id.clone()))
        .collect();
    for (parent_id, child_id) in links {
        if let Some(parent) = sessions.iter_mut().find(|s| s.id == parent_id) {
            parent.add_child(&child_id);
        }
    }
    Ok(sessions)
}

fn print_session(session: &Session, all: &[Session], indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{pad}Session {} ({})", session.id, session.agent_kind);
    println!("{pad}  {}", session.description);
    println!("{pad}  started {}", session.start_time);
    for checkpoint in &session.checkpoints {
        match checkpoint.kind {
            CheckpointKind::Temporary => {
                println!(
                    "{pad}  temporary {} {}",
                    checkpoint.id,
                    entire_core::textutil::first_line(&checkpoint.message)
                );
            }
            CheckpointKind::Committed => {
                let pct = checkpoint
                    .attribution
                    .as_ref()
                    .map_or(0.0, |a| a.agent_percentage);
                println!(
                    "{pad}  committed {} on {} (agent {pct:.1}%)",
                    checkpoint.id,
                    checkpoint
                        .commit_ref
                        .as_deref()
                        .map(|c| &c[..7.min(c.len())])
                        .unwrap_or("?"),
                );
            }
        }
    }
    for child_id in &session.children {
        if let Some(child) = all.iter().find(|s| &s.id == child_id) {
            print_session(child, all, indent + 1);
        }
    }
}
