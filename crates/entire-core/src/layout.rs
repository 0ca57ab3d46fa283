//! Reference layout: names and locations of the auxiliary branches, the
//! sharded metadata tree, and the on-disk session state.
//!
//! Everything here is pure computation; no I/O.

use std::path::{Path, PathBuf};

/// The single metadata branch holding committed checkpoint records.
pub const METADATA_BRANCH: &str = "entire/sessions";

/// Branch namespace shared by shadow branches and the metadata branch.
pub const BRANCH_PREFIX: &str = "entire/";

/// Directory under the git common dir holding per-session state files.
pub const STATE_DIR: &str = "entire-sessions";

/// Worktree overlay root; exists only inside temporary snapshots.
pub const OVERLAY_ROOT: &str = ".entire/metadata";

/// Minimum length of the hex suffix of a shadow branch name.
const MIN_SHORT_HASH: usize = 7;

/// Shadow branch name for a base commit: `entire/<first 7 hex chars>`.
pub fn shadow_branch_for(base_commit_id: &str) -> String {
    let end = base_commit_id
        .char_indices()
        .nth(MIN_SHORT_HASH)
        .map_or(base_commit_id.len(), |(i, _)| i);
    format!("{}{}", BRANCH_PREFIX, &base_commit_id[..end])
}

/// Whether `name` is a shadow branch: `entire/<7+ hex chars>`, with
/// `entire/sessions` explicitly excluded.
pub fn is_shadow(name: &str) -> bool {
    if name == METADATA_BRANCH {
        return false;
    }
    match name.strip_prefix(BRANCH_PREFIX) {
        Some(suffix) => {
            suffix.len() >= MIN_SHORT_HASH && suffix.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// The metadata branch name.
pub fn metadata_branch() -> &'static str {
    METADATA_BRANCH
}

/// Sharded tree path for a checkpoint id: `<id[:2]>/<id[2:]>`.
pub fn checkpoint_path(id: &str) -> String {
    if id.len() <= 2 {
        return id.to_string();
    }
    format!("{}/{}", &id[..2], &id[2..])
}

/// Path of the session state file inside the shared common directory.
pub fn session_state_path(common_dir: &Path, session_id: &str) -> PathBuf {
    common_dir.join(STATE_DIR).join(format!("{session_id}.json"))
}

/// Directory holding all session state files.
pub fn session_state_dir(common_dir: &Path) -> PathBuf {
    common_dir.join(STATE_DIR)
}

/// Path of the advisory lock guarding reference-mutating sections.
pub fn state_lock_path(common_dir: &Path) -> PathBuf {
    common_dir.join(STATE_DIR).join(".lock")
}

/// Overlay directory for a session inside a temporary snapshot tree.
pub fn overlay_dir(session_id: &str) -> String {
    format!("{OVERLAY_ROOT}/{session_id}")
}

/// Build a stable session id from an agent-supplied token:
/// `YYYY-MM-DD-<token>`, dated at first observation (UTC).
/// Idempotent when the token already carries a date prefix.
pub fn entire_session_id(token: &str) -> String {
    if has_date_prefix(token) {
        return token.to_string();
    }
    let today = time::OffsetDateTime::now_utc().date();
    format!(
        "{:04}-{:02}-{:02}-{}",
        today.year(),
        u8::from(today.month()),
        today.day(),
        token
    )
}

/// Strip the `YYYY-MM-DD-` prefix from a session id, recovering the
/// agent-native session token. Ids without the prefix pass through.
pub fn agent_session_token(session_id: &str) -> &str {
    if has_date_prefix(session_id) {
        &session_id[11..]
    } else {
        session_id
    }
}

fn has_date_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() > 11
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
        && b[10] == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_shadow_branch_name_predicate() {
        let cases = [
            // Valid shadow branches (7+ hex chars)
            ("entire/abc1234", true),
            ("entire/1234567", true),
            ("entire/abcdef0123456789abcdef0123456789abcdef01", true),
            ("entire/AbCdEf1", true),
            // Invalid patterns
            ("entire/", false),
            ("entire/abc123", false),
            ("entire/a", false),
            ("entire/ghijklm", false),
            ("entire/sessions", false),
            ("abc1234", false),
            ("feature/abc1234", false),
            ("main", false),
            ("master", false),
            ("", false),
            ("entire", false),
        ];
        for (name, want) in cases {
            assert_eq!(is_shadow(name), want, "is_shadow({name:?})");
        }
    }

    #[test]
    fn shadow_branch_for_shortens_to_seven() {
        assert_eq!(
            shadow_branch_for("abcdef0123456789abcdef0123456789abcdef01"),
            "entire/abcdef0"
        );
        assert!(is_shadow(&shadow_branch_for(
            "abcdef0123456789abcdef0123456789abcdef01"
        )));
    }

    #[test]
    fn checkpoint_path_shards_by_first_two() {
        assert_eq!(checkpoint_path("abc123def456"), "ab/c123def456");
        assert_eq!(checkpoint_path("000000000000"), "00/0000000000");
    }

    #[test]
    fn session_state_paths() {
        let common = Path::new("/repo/.git");
        assert_eq!(
            session_state_path(common, "2025-01-01-abc"),
            PathBuf::from("/repo/.git/entire-sessions/2025-01-01-abc.json")
        );
        assert_eq!(
            state_lock_path(common),
            PathBuf::from("/repo/.git/entire-sessions/.lock")
        );
    }

    #[test]
    fn overlay_dir_for_session() {
        assert_eq!(
            overlay_dir("2025-01-01-abc"),
            ".entire/metadata/2025-01-01-abc"
        );
    }

    #[test]
    fn session_id_prefixing_is_idempotent() {
        let id = entire_session_id("abc-def");
        assert!(has_date_prefix(&id));
        assert_eq!(entire_session_id(&id), id);
        assert_eq!(agent_session_token(&id), "abc-def");
    }

    #[test]
    fn token_without_prefix_passes_through() {
        assert_eq!(agent_session_token("plain-token"), "plain-token");
    }

    #[test]
    fn date_prefix_detection_rejects_near_misses() {
        assert!(!has_date_prefix("2025-01-01"));
        assert!(!has_date_prefix("20250101-abc"));
        assert!(!has_date_prefix("2025-1-01-abc"));
        assert!(has_date_prefix("2025-01-01-abc"));
    }
}
