//! Agent adapters.
//!
//! The checkpoint engine only depends on the small capability set below;
//! each supported vendor implements it once. The engine consumes parsed
//! transcripts and canonical session ids, and hands back session logs to
//! restore on resume.

pub mod claudecode;

use entire_core::{layout, Error, Result};
use std::path::{Path, PathBuf};

/// A restored agent session, ready to be written back into the vendor's
/// session directory.
#[derive(Debug, Clone)]
pub struct AgentSession {
    /// Vendor-native session id (date prefix already stripped).
    pub session_id: String,
    pub agent_name: String,
    pub repo_path: PathBuf,
    /// Where the session log will be written.
    pub session_ref: PathBuf,
    /// The raw vendor-native session log.
    pub native_data: Vec<u8>,
}

/// Capability set the engine needs from an agent vendor.
pub trait Agent {
    /// Short machine name, e.g. `claudecode`.
    fn name(&self) -> &'static str;

    /// The vendor's session directory for a repository working directory.
    fn session_dir(&self, cwd: &Path) -> Result<PathBuf>;

    /// Recover the vendor-native session id from an entire session id.
    fn extract_session_id<'a>(&self, entire_id: &'a str) -> &'a str;

    /// Write a restored session log into the vendor's session directory.
    fn write_session(&self, session: &AgentSession) -> Result<()>;

    /// The command a user runs to continue the session.
    fn format_resume_command(&self, agent_id: &str) -> String;
}

/// Supported agent vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    ClaudeCode,
}

impl AgentKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "claudecode" | "claude-code" => Some(AgentKind::ClaudeCode),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claudecode",
        }
    }

    pub fn agent(&self) -> &'static dyn Agent {
        match self {
            AgentKind::ClaudeCode => &claudecode::ClaudeCode,
        }
    }
}

/// The default agent when none can be detected.
pub fn default_agent() -> &'static dyn Agent {
    AgentKind::ClaudeCode.agent()
}

/// Resolve an agent by the `agent_kind` recorded in checkpoint metadata.
pub fn agent_for_kind(kind: &str) -> Result<&'static dyn Agent> {
    AgentKind::from_name(kind)
        .map(|kind| kind.agent())
        .ok_or_else(|| Error::IOFailed(format!("unknown agent kind '{kind}'")))
}

/// Shared helper: strip the date prefix of an entire session id.
pub(crate) fn native_session_id(entire_id: &str) -> &str {
    layout::agent_session_token(entire_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_name() {
        let kind = AgentKind::from_name("claudecode").unwrap();
        assert_eq!(kind.name(), "claudecode");
        assert_eq!(kind.agent().name(), "claudecode");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(AgentKind::from_name("mystery").is_none());
        assert!(agent_for_kind("mystery").is_err());
    }

    #[test]
    fn default_agent_is_claude_code() {
        assert_eq!(default_agent().name(), "claudecode");
    }
}
