use anyhow::Context;
use entire_agent::{agent_for_kind, AgentSession};
use entire_core::{textutil, trailer, Error};
use entire_store::{GitStore, SessionsStore};

/// `entire resume <branch>`: switch to a branch and restore its agent
/// session log from the checkpoint recorded on the tip commit.
///
/// Everything past the checkout degrades gracefully: a missing trailer,
/// missing metadata, or an unknown agent all print guidance and exit 0.
pub fn execute(branch: &str) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = GitStore::discover(&cwd).context("not a git repository")?;

    let current = store.current_branch()?;
    if current.as_deref() != Some(branch) {
        if !store.branch_exists(branch) {
            if store.remote_branch_tip("origin", branch).is_some() {
                eprintln!("Branch '{branch}' exists on origin but not locally.");
                eprintln!("To fetch it, run:");
                eprintln!("  git fetch origin {branch}:{branch}");
                eprintln!();
                eprintln!("Then run this command again.");
                return Ok(());
            }
            return Err(Error::RefNotFound(branch.to_string()).into());
        }
        if !store.is_worktree_clean()? {
            return Err(Error::WorktreeDirty.into());
        }
        checkout_branch(&store, branch)?;
        eprintln!("Switched to branch '{branch}'");
    }

    resume_from_tip(&store, branch, &cwd)
}

fn checkout_branch(store: &GitStore, branch: &str) -> anyhow::Result<()> {
    let repo = store.repo();
    let tip = store.branch_tip(branch)?;
    let commit = repo.find_commit(tip).context("resolving branch tip")?;
    let mut opts = git2::build::CheckoutBuilder::new();
    opts.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut opts))
        .context("checking out branch tree")?;
    repo.set_head(&format!("refs/heads/{branch}"))
        .context("moving HEAD")?;
    Ok(())
}

fn resume_from_tip(store: &GitStore, branch: &str, cwd: &std::path::Path) -> anyhow::Result<()> {
    let head = store.head_commit_id()?;
    let head_oid = store.resolve_commit(&head)?;
    let message = store.commit_message(head_oid)?;

    let Some(checkpoint_id) = trailer::parse_checkpoint(&message) else {
        eprintln!("No checkpoint found for the last commit on branch '{branch}'");
        eprintln!("Commit: {} {}", &head[..7], textutil::first_line(&message));
        return Ok(());
    };

    let sessions = SessionsStore::new(store);
    let record = match sessions.read(&checkpoint_id) {
        Ok(record) => record,
        Err(_) => match sessions.read_remote("origin", &checkpoint_id) {
            Ok(record) => record,
            Err(_) => {
                eprintln!(
                    "Checkpoint '{checkpoint_id}' found in commit but session metadata \
                     not available"
                );
                eprintln!("To fetch the metadata branch, run:");
                eprintln!("  git fetch origin entire/sessions:entire/sessions");
                return Ok(());
            }
        },
    };

    let session_id = record.metadata.session_id.clone();
    let agent = match agent_for_kind(&record.metadata.agent_kind) {
        Ok(agent) => agent,
        Err(_) => {
            eprintln!(
                "Session '{session_id}' was recorded by unknown agent '{}'",
                record.metadata.agent_kind
            );
            return Ok(());
        }
    };

    let agent_session_id = agent.extract_session_id(&session_id).to_string();
    let session_dir = match agent.session_dir(cwd) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Cannot determine the agent session directory: {e}");
            return Ok(());
        }
    };
    let session_log_path = session_dir.join(format!("{agent_session_id}.jsonl"));

    if session_log_path.exists() {
        // Never clobber a live local session log.
        eprintln!("Session log already exists: {}", session_log_path.display());
    } else {
        match record.payload.get("full.jsonl") {
            Some(native_data) => {
                let agent_session = AgentSession {
                    session_id: agent_session_id.clone(),
                    agent_name: agent.name().to_string(),
                    repo_path: cwd.to_path_buf(),
                    session_ref: session_log_path.clone(),
                    native_data: native_data.clone(),
                };
                agent.write_session(&agent_session)?;
                eprintln!("Session restored to: {}", session_log_path.display());
            }
            None => {
                eprintln!(
                    "Session '{session_id}' found in commit trailer but session log \
                     not available"
                );
            }
        }
    }

    eprintln!("Session: {session_id}");
    eprintln!();
    eprintln!("To continue this session, run:");
    eprintln!("  {}", agent.format_resume_command(&agent_session_id));
    Ok(())
}
