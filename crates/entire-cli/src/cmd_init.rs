use anyhow::Context;
use entire_agent::claudecode;
use entire_store::GitStore;
use std::path::Path;

/// Marker comment identifying hooks installed by this tool.
const HOOK_MARKER: &str = "Entire CLI hooks";

const HOOK_NAMES: [&str; 4] = ["prepare-commit-msg", "commit-msg", "post-commit", "pre-push"];

/// `entire init`: install the four git hooks that drive the commit-time
/// state machine, and register the agent-side hooks in the Claude Code
/// project settings. Re-running overwrites our own hooks but refuses to
/// clobber foreign ones.
pub fn execute() -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let store = GitStore::discover(&cwd).context("not in a git repository")?;
    let hooks_dir = store.common_dir().join("hooks");
    std::fs::create_dir_all(&hooks_dir).context("failed to create hooks directory")?;

    for name in HOOK_NAMES {
        let path = hooks_dir.join(name);
        if path.exists() {
            let existing = std::fs::read_to_string(&path).unwrap_or_default();
            if !existing.contains(HOOK_MARKER) {
                anyhow::bail!(
                    "a {name} hook already exists and was not installed by entire; \
                     remove it first: {}",
                    path.display()
                );
            }
        }
        write_hook_file(&path, &hook_content(name))
            .with_context(|| format!("failed to install {name} hook"))?;
    }
    println!("Installed git hooks (prepare-commit-msg, commit-msg, post-commit, pre-push)");

    let workdir = store.workdir()?.to_path_buf();
    let settings = claudecode::install_hooks(&workdir)
        .context("failed to register Claude Code hooks")?;
    println!(
        "Registered agent hooks in {} (UserPromptSubmit, Stop)",
        settings.display()
    );
    Ok(())
}

fn hook_content(name: &str) -> String {
    match name {
        "prepare-commit-msg" => format!(
            "#!/bin/sh\n# {HOOK_MARKER}\nentire hooks git prepare-commit-msg \"$1\" \"$2\" 2>/dev/null || true\n"
        ),
        "commit-msg" => format!(
            "#!/bin/sh\n# {HOOK_MARKER}\n# Strip trailer if no user content (allows aborting empty commits)\nentire hooks git commit-msg \"$1\" || exit 1\n"
        ),
        "post-commit" => format!(
            "#!/bin/sh\n# {HOOK_MARKER}\n# Condense session data if the commit has an Entire-Checkpoint trailer\nentire hooks git post-commit || true\n"
        ),
        "pre-push" => format!(
            "#!/bin/sh\n# {HOOK_MARKER}\n# Push session metadata alongside the user's push\nentire hooks git pre-push \"$1\" || true\n"
        ),
        other => unreachable!("unknown hook {other}"),
    }
}

fn write_hook_file(path: &Path, content: &str) -> anyhow::Result<()> {
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
