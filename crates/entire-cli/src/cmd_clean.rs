use anyhow::Context;
use entire_store::{janitor, GitStore};

/// `entire clean [--force]`: preview or delete shadow branches. The
/// metadata branch is never touched.
pub fn execute(force: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = GitStore::discover(&cwd).context("failed to open git repository")?;

    let branches = janitor::list_shadow_branches(&store)?;
    if branches.is_empty() {
        println!("No shadow branches to clean up.");
        return Ok(());
    }

    if !force {
        println!("{} shadow branches found:", branches.len());
        for branch in &branches {
            println!("  {branch}");
        }
        println!();
        println!("Run with --force to delete these branches.");
        return Ok(());
    }

    let (deleted, failed) = janitor::delete_shadow_branches(&store, &branches)?;
    if !deleted.is_empty() {
        println!("Deleted {} shadow branches:", deleted.len());
        for branch in &deleted {
            println!("  {branch}");
        }
    }
    if !failed.is_empty() {
        println!();
        println!("Failed to delete {} branches:", failed.len());
        for branch in &failed {
            println!("  {branch}");
        }
        anyhow::bail!("failed to delete {} branches", failed.len());
    }
    Ok(())
}
