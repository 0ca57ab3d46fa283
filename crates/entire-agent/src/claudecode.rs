//! Claude Code adapter: JSONL transcript handling and session log layout.
//!
//! Claude Code stores one session per file under
//! `~/.claude/projects/<munged-cwd>/<session-id>.jsonl`, where the
//! working directory path has `/`, `.`, and `_` replaced by `-`.

use crate::{Agent, AgentSession};
use entire_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Tools whose invocations modify files.
pub const FILE_MODIFICATION_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Lines longer than this are treated as corrupt and skipped.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// A single line of Claude's JSONL transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptLine {
    #[serde(rename = "type", default)]
    pub line_type: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub message: Value,
}

/// Parse raw JSONL content into transcript lines. Malformed lines are
/// skipped rather than failing the whole transcript.
pub fn parse_transcript(data: &[u8]) -> Vec<TranscriptLine> {
    let mut lines = Vec::new();
    for raw in data.split(|&b| b == b'\n') {
        if raw.is_empty() || raw.len() > MAX_LINE_BYTES {
            continue;
        }
        if let Ok(line) = serde_json::from_slice::<TranscriptLine>(raw) {
            lines.push(line);
        }
    }
    lines
}

/// Convert transcript lines back to JSONL bytes.
pub fn serialize_transcript(lines: &[TranscriptLine]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for line in lines {
        serde_json::to_writer(&mut buf, line)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Files modified by tool calls in the transcript, in first-seen order.
pub fn extract_modified_files(lines: &[TranscriptLine]) -> Vec<String> {
    let mut files = Vec::new();
    for line in lines {
        if line.line_type != "assistant" {
            continue;
        }
        let Some(blocks) = line.message.get("content").and_then(Value::as_array) else {
            continue;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            let name = block.get("name").and_then(Value::as_str).unwrap_or("");
            if !FILE_MODIFICATION_TOOLS.contains(&name) {
                continue;
            }
            let input = block.get("input");
            let file = input
                .and_then(|i| i.get("file_path"))
                .or_else(|| input.and_then(|i| i.get("notebook_path")))
                .and_then(Value::as_str)
                .unwrap_or("");
            if !file.is_empty() && !files.iter().any(|f| f == file) {
                files.push(file.to_string());
            }
        }
    }
    files
}

fn user_text(message: &Value) -> Option<String> {
    let content = message.get("content")?;
    // String content
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    // Array content: join text blocks
    let blocks = content.as_array()?;
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n\n"))
    }
}

/// The last user message in the transcript, if any.
pub fn extract_last_user_prompt(lines: &[TranscriptLine]) -> Option<String> {
    lines
        .iter()
        .rev()
        .filter(|l| l.line_type == "user")
        .find_map(|l| user_text(&l.message))
}

/// Every user message in the transcript, in order. Tool-result carriers
/// (user lines without text) are skipped.
pub fn extract_user_prompts(lines: &[TranscriptLine]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.line_type == "user")
        .filter_map(|l| user_text(&l.message))
        .collect()
}

/// Transcript lines up to and including the line with the given UUID.
/// An empty UUID (or one not present) keeps the full transcript.
pub fn truncate_at_uuid(lines: &[TranscriptLine], uuid: &str) -> Vec<TranscriptLine> {
    if uuid.is_empty() {
        return lines.to_vec();
    }
    for (i, line) in lines.iter().enumerate() {
        if line.uuid == uuid {
            return lines[..=i].to_vec();
        }
    }
    lines.to_vec()
}

/// The UUID of the user message carrying the tool_result for the given
/// tool_use id.
pub fn find_checkpoint_uuid(lines: &[TranscriptLine], tool_use_id: &str) -> Option<String> {
    for line in lines {
        if line.line_type != "user" {
            continue;
        }
        let Some(blocks) = line.message.get("content").and_then(Value::as_array) else {
            continue;
        };
        let hit = blocks.iter().any(|b| {
            b.get("type").and_then(Value::as_str) == Some("tool_result")
                && b.get("tool_use_id").and_then(Value::as_str) == Some(tool_use_id)
        });
        if hit {
            return Some(line.uuid.clone());
        }
    }
    None
}

/// Render the generated-context overlay file: the session's prompts and
/// the files its tool calls touched.
pub fn render_context(lines: &[TranscriptLine]) -> String {
    let mut out = String::new();
    for prompt in extract_user_prompts(lines) {
        out.push_str("[User] ");
        out.push_str(&prompt);
        out.push('\n');
    }
    let files = extract_modified_files(lines);
    if !files.is_empty() {
        out.push_str("\n[Files Modified]\n");
        for file in files {
            out.push_str("- ");
            out.push_str(&file);
            out.push('\n');
        }
    }
    out
}

// ── Hook registration ───────────────────────────────────────────────

/// Deny rule blocking the agent from reading checkpoint metadata.
const METADATA_DENY_RULE: &str = "Read(./.entire/metadata/**)";

/// Hook events wired to the observation entrypoints.
const HOOK_EVENTS: &[(&str, &str)] = &[
    ("UserPromptSubmit", "entire hooks agent prompt-submit"),
    ("Stop", "entire hooks agent stop"),
];

/// Project-level Claude Code settings file.
pub fn settings_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".claude").join("settings.json")
}

/// Whether a matcher group already invokes one of our hook commands.
fn matcher_group_is_ours(group: &Value) -> bool {
    group
        .get("hooks")
        .and_then(Value::as_array)
        .is_some_and(|hooks| {
            hooks.iter().any(|hook| {
                hook.get("command")
                    .and_then(Value::as_str)
                    .is_some_and(|cmd| cmd.contains("entire hooks agent"))
            })
        })
}

/// Register the agent-side hooks in `.claude/settings.json`: wire
/// `UserPromptSubmit` and `Stop` to the observation entrypoints and deny
/// the agent read access to the checkpoint metadata overlay.
///
/// Idempotent: re-installing replaces only our own matcher groups and
/// never duplicates the deny rule. Everything else in the file —
/// foreign matcher groups, `permissions.allow`, unknown keys — is
/// preserved untouched.
pub fn install_hooks(repo_root: &Path) -> Result<PathBuf> {
    let path = settings_path(repo_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut settings: Value = match std::fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| Error::IOFailed(format!("unreadable {}: {e}", path.display())))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e.into()),
    };
    let root = settings
        .as_object_mut()
        .ok_or_else(|| Error::IOFailed(format!("{} is not a JSON object", path.display())))?;

    // Merge hooks, keeping foreign matcher groups.
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or_else(|| Error::IOFailed("settings hooks is not an object".to_string()))?;
    for (event, command) in HOOK_EVENTS {
        let group = serde_json::json!({
            "matcher": "",
            "hooks": [{ "type": "command", "command": command }]
        });
        let mut groups: Vec<Value> = hooks
            .get(*event)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|g| !matcher_group_is_ours(g))
            .collect();
        groups.push(group);
        hooks.insert((*event).to_string(), Value::Array(groups));
    }

    // Merge the metadata deny rule, preserving allow/ask/unknown keys.
    let permissions = root
        .entry("permissions")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or_else(|| Error::IOFailed("settings permissions is not an object".to_string()))?;
    let deny = permissions
        .entry("deny")
        .or_insert_with(|| serde_json::json!([]))
        .as_array_mut()
        .ok_or_else(|| Error::IOFailed("permissions.deny is not an array".to_string()))?;
    let already_denied = deny
        .iter()
        .any(|rule| rule.as_str() == Some(METADATA_DENY_RULE));
    if !already_denied {
        deny.push(Value::String(METADATA_DENY_RULE.to_string()));
    }

    std::fs::write(&path, serde_json::to_string_pretty(&settings)?)?;
    Ok(path)
}

/// The Claude Code agent.
pub struct ClaudeCode;

/// Munge a working directory path the way Claude Code names its
/// per-project session directories: `/`, `.`, and `_` become `-`.
fn project_dir_name(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | '_' => '-',
            other => other,
        })
        .collect()
}

impl Agent for ClaudeCode {
    fn name(&self) -> &'static str {
        "claudecode"
    }

    fn session_dir(&self, cwd: &Path) -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::IOFailed("cannot determine home directory".to_string()))?;
        Ok(home
            .join(".claude")
            .join("projects")
            .join(project_dir_name(cwd)))
    }

    fn extract_session_id<'a>(&self, entire_id: &'a str) -> &'a str {
        crate::native_session_id(entire_id)
    }

    fn write_session(&self, session: &AgentSession) -> Result<()> {
        if let Some(parent) = session.session_ref.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&session.session_ref, &session.native_data)?;
        Ok(())
    }

    fn format_resume_command(&self, agent_id: &str) -> String {
        format!("claude --resume {agent_id}")
    }
}
