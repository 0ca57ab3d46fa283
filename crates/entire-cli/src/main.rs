mod cmd_clean;
mod cmd_hooks;
mod cmd_init;
mod cmd_resume;
mod cmd_status;
mod cmd_summarize;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "entire",
    version,
    about = "Git-native checkpoints and attribution for AI coding sessions"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the git hooks that drive checkpointing
    Init,
    /// Clean up shadow branches
    Clean {
        /// Actually delete branches (otherwise just preview)
        #[arg(short, long)]
        force: bool,
    },
    /// Switch to a branch and resume its session
    Resume {
        /// Branch to resume
        branch: String,
    },
    /// Show active sessions and their checkpoints
    Status,
    /// Create a PR-ready branch with squashed commits
    Summarize {
        /// Commit message for the squashed commit
        #[arg(short, long)]
        message: String,
        /// PR target branch
        #[arg(short, long, default_value = "main")]
        target: String,
        /// Custom summary branch name (default: entire/pr/<current-branch>)
        #[arg(short, long)]
        branch: Option<String>,
        /// Overwrite the summary branch even if it exists on the remote
        #[arg(short, long)]
        force: bool,
    },
    /// Hook entrypoints (called by git hooks and agent hooks)
    Hooks {
        #[command(subcommand)]
        cmd: HookCmd,
    },
}

#[derive(Subcommand)]
enum HookCmd {
    /// Git hook entrypoints
    Git {
        #[command(subcommand)]
        cmd: GitHookCmd,
    },
    /// Agent hook entrypoints (read the hook payload JSON on stdin)
    Agent {
        #[command(subcommand)]
        cmd: AgentHookCmd,
    },
}

#[derive(Subcommand)]
enum GitHookCmd {
    /// Inject a placeholder message derived from the session prompt
    PrepareCommitMsg {
        /// Path to the commit message file
        msg_file: String,
        /// Message source (message, template, merge, squash, commit, or empty)
        #[arg(default_value = "")]
        source: String,
    },
    /// Validate the message and stamp checkpoint trailers
    CommitMsg {
        /// Path to the commit message file
        msg_file: String,
    },
    /// Condense session data for the commit just created
    PostCommit,
    /// Push session metadata alongside the user's push
    PrePush {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
    },
}

#[derive(Subcommand)]
enum AgentHookCmd {
    /// Open or resume a session at prompt submission
    PromptSubmit,
    /// Write a temporary snapshot when the agent stops
    Stop,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Init => cmd_init::execute(),
        Command::Clean { force } => cmd_clean::execute(force),
        Command::Resume { branch } => cmd_resume::execute(&branch),
        Command::Status => cmd_status::execute(),
        Command::Summarize {
            message,
            target,
            branch,
            force,
        } => cmd_summarize::execute(&message, &target, branch.as_deref(), force),
        Command::Hooks { cmd } => match cmd {
            HookCmd::Git { cmd } => match cmd {
                GitHookCmd::PrepareCommitMsg { msg_file, source } => {
                    cmd_hooks::prepare_commit_msg(&msg_file, &source)
                }
                GitHookCmd::CommitMsg { msg_file } => cmd_hooks::commit_msg(&msg_file),
                GitHookCmd::PostCommit => cmd_hooks::post_commit(),
                GitHookCmd::PrePush { remote } => cmd_hooks::pre_push(&remote),
            },
            HookCmd::Agent { cmd } => match cmd {
                AgentHookCmd::PromptSubmit => cmd_hooks::agent_prompt_submit(),
                AgentHookCmd::Stop => cmd_hooks::agent_stop(),
            },
        },
    };

    if let Err(err) = result {
        eprintln!("entire: {err:#}");
        let code = err
            .downcast_ref::<entire_core::Error>()
            .map_or(1, entire_core::Error::exit_code);
        std::process::exit(code);
    }
}
