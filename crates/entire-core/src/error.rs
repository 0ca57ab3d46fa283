//! Error types shared across the entire workspace.

use thiserror::Error;

/// Main error type for the checkpoint engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The working directory is not inside a git repository (or the
    /// repository is bare and has no working tree).
    #[error("not a git repository")]
    NotARepository,

    /// A named reference does not exist.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// A shadow branch for this base already belongs to another session.
    #[error(
        "session ID conflict: shadow branch {branch} belongs to session '{existing}', \
         not '{requested}'"
    )]
    SessionIdConflict {
        branch: String,
        existing: String,
        requested: String,
    },

    /// A shadow branch exists but its contents cannot be interpreted.
    #[error("shadow branch corrupt: {0}")]
    ShadowBranchCorrupt(String),

    /// A commit-message trailer could not be parsed.
    #[error("malformed trailer: {0}")]
    TrailerParse(String),

    /// Checkpoint metadata is absent from the metadata branch.
    #[error("checkpoint metadata missing: {0}")]
    MetadataMissing(String),

    /// The base/shadow/user trees disagree in an unresolvable way.
    #[error("attribution input mismatch: {0}")]
    AttributionInput(String),

    /// Condensation aborted; `step` names the failing protocol step.
    #[error("condensation failed at step '{step}': {reason}")]
    CondensationFailed { step: &'static str, reason: String },

    /// Another process holds the session-state lock.
    #[error("session state is locked by another process ({0})")]
    LockUnavailable(String),

    /// The working tree has uncommitted changes.
    #[error("you have uncommitted changes; commit or stash them first")]
    WorktreeDirty,

    /// The current branch has no commits ahead of the summarize target.
    #[error("no commits to summarize - branch is at same commit as {0}")]
    NoCommitsToSummarize(String),

    /// The summarize target branch does not exist.
    #[error("target branch '{0}' not found")]
    TargetBranchMissing(String),

    /// An underlying I/O or object-store operation failed.
    #[error("{0}")]
    IOFailed(String),
}

impl Error {
    /// Process exit code: 1 for user errors (validation, conflict),
    /// 2 for internal failures (I/O, corrupted state).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotARepository
            | Error::SessionIdConflict { .. }
            | Error::WorktreeDirty
            | Error::NoCommitsToSummarize(_)
            | Error::TargetBranchMissing(_)
            | Error::RefNotFound(_) => 1,
            Error::ShadowBranchCorrupt(_)
            | Error::TrailerParse(_)
            | Error::MetadataMissing(_)
            | Error::AttributionInput(_)
            | Error::CondensationFailed { .. }
            | Error::LockUnavailable(_)
            | Error::IOFailed(_) => 2,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IOFailed(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::IOFailed(format!("JSON error: {e}"))
    }
}

/// Result type alias for the entire workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_exit_one() {
        assert_eq!(Error::WorktreeDirty.exit_code(), 1);
        assert_eq!(Error::NotARepository.exit_code(), 1);
        assert_eq!(Error::TargetBranchMissing("main".into()).exit_code(), 1);
        assert_eq!(
            Error::SessionIdConflict {
                branch: "entire/abc1234".into(),
                existing: "a".into(),
                requested: "b".into(),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn internal_errors_exit_two() {
        assert_eq!(Error::IOFailed("disk".into()).exit_code(), 2);
        assert_eq!(Error::MetadataMissing("0".into()).exit_code(), 2);
        assert_eq!(
            Error::CondensationFailed {
                step: "write-record",
                reason: "x".into(),
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn conflict_message_names_both_sessions() {
        let e = Error::SessionIdConflict {
            branch: "entire/abc1234".into(),
            existing: "2025-01-01-alpha".into(),
            requested: "2025-01-01-beta".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("session ID conflict"));
        assert!(msg.contains("2025-01-01-alpha"));
        assert!(msg.contains("2025-01-01-beta"));
    }
}
