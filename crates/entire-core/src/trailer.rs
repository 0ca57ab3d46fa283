//! Commit-message trailer codec.
//!
//! Trailers are `Key: Value` lines in the final paragraph of a commit
//! message, separated from the body by a blank line. Keys are emitted in
//! lexicographic order so rewritten messages hash deterministically.

use std::collections::BTreeMap;

pub const CHECKPOINT_KEY: &str = "Entire-Checkpoint";
pub const SESSION_KEY: &str = "Entire-Session";
pub const STRATEGY_KEY: &str = "Entire-Strategy";
pub const SOURCE_BRANCH_KEY: &str = "Entire-Source-Branch";
pub const SOURCE_RANGE_KEY: &str = "Entire-Source-Range";
pub const GENERATED_BY_KEY: &str = "Generated-By";

/// Split a line of the form `Key: Value`. Keys must start with a letter
/// and contain only letters, digits, and hyphens.
fn split_trailer_line(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some((key, rest.strip_prefix(' ').unwrap_or(rest)))
}

/// The final paragraph of a message, or `None` when the message is a
/// single paragraph (a trailer block requires a body before it).
fn final_paragraph(message: &str) -> Option<&str> {
    let trimmed = message.trim_end();
    let idx = trimmed.rfind("\n\n")?;
    Some(trimmed[idx + 2..].trim_start_matches('\n'))
}

/// Parse the trailers from the final paragraph of `message`. Malformed
/// lines are skipped, not fatal. Duplicate keys keep the last value.
pub fn parse_trailers(message: &str) -> BTreeMap<String, String> {
    let mut trailers = BTreeMap::new();
    let Some(paragraph) = final_paragraph(message) else {
        return trailers;
    };
    for line in paragraph.lines() {
        if let Some((key, value)) = split_trailer_line(line) {
            trailers.insert(key.to_string(), value.trim_end().to_string());
        }
    }
    trailers
}

/// Extract the checkpoint id from a commit message, if present.
pub fn parse_checkpoint(message: &str) -> Option<String> {
    parse_trailers(message).remove(CHECKPOINT_KEY)
}

/// Extract the session id from a commit message, if present.
pub fn parse_session(message: &str) -> Option<String> {
    parse_trailers(message).remove(SESSION_KEY)
}

/// Whether the final paragraph of `message` contains at least one trailer.
fn has_trailer_paragraph(message: &str) -> bool {
    final_paragraph(message)
        .map(|p| p.lines().any(|l| split_trailer_line(l).is_some()))
        .unwrap_or(false)
}

/// The message body with any trailer paragraph removed.
pub fn strip_trailers(message: &str) -> String {
    if !has_trailer_paragraph(message) {
        return message.trim_end().to_string();
    }
    let trimmed = message.trim_end();
    let idx = trimmed.rfind("\n\n").expect("trailer paragraph implies two paragraphs");
    trimmed[..idx].trim_end().to_string()
}

/// Emit `body`, a blank line, then the trailers in lexicographic key
/// order. An empty trailer map returns the body unchanged.
pub fn append_trailers(body: &str, trailers: &BTreeMap<String, String>) -> String {
    let body = body.trim_end();
    if trailers.is_empty() {
        return format!("{body}\n");
    }
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(body);
    out.push_str("\n\n");
    for (key, value) in trailers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn round_trip_preserves_key_value_set() {
        let trailers = map(&[
            (SESSION_KEY, "2025-01-01-abc"),
            (CHECKPOINT_KEY, "abc123def456"),
            (STRATEGY_KEY, "manual-commit"),
        ]);
        let message = append_trailers("Add feature\n\nLonger body text.", &trailers);
        assert_eq!(parse_trailers(&message), trailers);
    }

    #[test]
    fn emission_order_is_lexicographic() {
        let trailers = map(&[
            (STRATEGY_KEY, "manual-commit"),
            (CHECKPOINT_KEY, "abc123def456"),
            (SESSION_KEY, "2025-01-01-abc"),
        ]);
        let message = append_trailers("Subject", &trailers);
        let tail: Vec<&str> = message.trim_end().lines().rev().take(3).collect();
        // Reversed tail: Strategy, Session, Checkpoint
        assert!(tail[0].starts_with(STRATEGY_KEY));
        assert!(tail[1].starts_with(SESSION_KEY));
        assert!(tail[2].starts_with(CHECKPOINT_KEY));
    }

    #[test]
    fn source_range_and_checkpoint_coexist_sorted() {
        let trailers = map(&[
            (SOURCE_RANGE_KEY, "abc1234..def5678"),
            (CHECKPOINT_KEY, "abc123def456"),
            (SOURCE_BRANCH_KEY, "feature/x"),
        ]);
        let message = append_trailers("Squash", &trailers);
        let checkpoint_pos = message.find(CHECKPOINT_KEY).unwrap();
        let branch_pos = message.find(SOURCE_BRANCH_KEY).unwrap();
        let range_pos = message.find(SOURCE_RANGE_KEY).unwrap();
        assert!(checkpoint_pos < branch_pos && branch_pos < range_pos);
        assert_eq!(parse_trailers(&message), trailers);
    }

    #[test]
    fn only_final_paragraph_is_recognised() {
        let message = "Subject\n\nFake-Trailer: in body\n\nmore prose here\n\nReal-Key: yes\n";
        let trailers = parse_trailers(message);
        assert_eq!(trailers.get("Real-Key").map(String::as_str), Some("yes"));
        assert!(!trailers.contains_key("Fake-Trailer"));
    }

    #[test]
    fn single_paragraph_has_no_trailers() {
        assert!(parse_trailers("Fix: the thing").is_empty());
        assert_eq!(parse_checkpoint("Fix: the thing"), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let message = "Subject\n\nGood-Key: ok\n0bad: nope\nno colon here\nAlso-Good: fine\n";
        let trailers = parse_trailers(message);
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers.get("Good-Key").map(String::as_str), Some("ok"));
        assert_eq!(trailers.get("Also-Good").map(String::as_str), Some("fine"));
    }

    #[test]
    fn parse_checkpoint_finds_id() {
        let trailers = map(&[(CHECKPOINT_KEY, "deadbeef1234")]);
        let message = append_trailers("Commit subject", &trailers);
        assert_eq!(parse_checkpoint(&message).as_deref(), Some("deadbeef1234"));
    }

    #[test]
    fn strip_trailers_returns_body() {
        let trailers = map(&[(SESSION_KEY, "2025-01-01-abc")]);
        let message = append_trailers("Subject\n\nBody paragraph.", &trailers);
        assert_eq!(strip_trailers(&message), "Subject\n\nBody paragraph.");
    }

    #[test]
    fn strip_trailers_without_trailers_is_identity() {
        assert_eq!(strip_trailers("Just a subject\n"), "Just a subject");
        assert_eq!(strip_trailers("Subject\n\nProse body."), "Subject\n\nProse body.");
    }

    #[test]
    fn empty_map_appends_nothing() {
        let out = append_trailers("Subject", &BTreeMap::new());
        assert_eq!(out, "Subject\n");
    }
}
