use anyhow::Context;
use entire_core::{trailer, Error};
use entire_store::{GitStore, StateStore};
use std::collections::BTreeMap;

/// `entire summarize -m <msg> [-t <target>]`: squash the commits of the
/// current branch since it diverged from the target into a single commit
/// on a summary branch, stamped with source trailers. The original
/// branch is untouched.
pub fn execute(
    message: &str,
    target: &str,
    summary_branch: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = GitStore::discover(&cwd).context("not in a git repository")?;

    let current = store
        .current_branch()?
        .ok_or_else(|| anyhow::anyhow!("HEAD is detached; check out a branch first"))?;
    if is_default_branch(&store, &current) {
        anyhow::bail!("cannot summarize '{current}' branch - create a feature branch first");
    }
    if !store.is_worktree_clean()? {
        return Err(Error::WorktreeDirty.into());
    }
    if !store.branch_exists(target) {
        return Err(Error::TargetBranchMissing(target.to_string()).into());
    }

    let head = store.branch_tip(&current)?;
    let target_tip = store.branch_tip(target)?;
    let merge_base = store
        .merge_base(head, target_tip)
        .with_context(|| format!("failed to find common ancestor with {target}"))?;
    let commit_count = store.count_commits_between(merge_base, head)?;
    if commit_count == 0 {
        return Err(Error::NoCommitsToSummarize(target.to_string()).into());
    }

    let summary_branch = summary_branch
        .map(str::to_string)
        .unwrap_or_else(|| format!("entire/pr/{current}"));
    if !force && store.remote_branch_tip("origin", &summary_branch).is_some() {
        anyhow::bail!(
            "summary branch '{summary_branch}' exists on remote. Use --force to overwrite"
        );
    }

    let mut trailers = BTreeMap::new();
    trailers.insert(
        trailer::SOURCE_BRANCH_KEY.to_string(),
        current.clone(),
    );
    trailers.insert(
        trailer::SOURCE_RANGE_KEY.to_string(),
        format!(
            "{}..{}",
            &merge_base.to_string()[..7],
            &head.to_string()[..7]
        ),
    );
    trailers.insert(
        trailer::GENERATED_BY_KEY.to_string(),
        "entire-cli".to_string(),
    );
    // Session trailers ride along when a session is live.
    let states = StateStore::new(&store.common_dir());
    if let Some(session) = states.current()? {
        trailers.insert(trailer::SESSION_KEY.to_string(), session.id);
        trailers.insert(trailer::STRATEGY_KEY.to_string(), session.strategy_name);
    }

    let full_message = trailer::append_trailers(message, &trailers);
    let source_tree = store.commit_tree(head)?;
    store.commit_on_branch(&summary_branch, &[merge_base], source_tree.id(), &full_message)?;

    println!();
    println!("Created summary branch: {summary_branch}");
    println!("Source branch: {current} ({commit_count} commits squashed)");
    println!();
    println!("Next steps:");
    println!("  1. Push to remote:    git push origin {summary_branch}");
    println!("  2. Create PR:         gh pr create --base {target} --head {summary_branch}");
    println!();
    println!("Your original branch '{current}' remains unchanged for reference.");
    Ok(())
}

fn is_default_branch(store: &GitStore, branch: &str) -> bool {
    match branch {
        "main" | "master" => true,
        _ => {
            // Respect a configured default on the origin remote if present.
            store
                .repo()
                .find_reference("refs/remotes/origin/HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(str::to_string))
                .is_some_and(|t| t.strip_prefix("refs/remotes/origin/") == Some(branch))
        }
    }
}
