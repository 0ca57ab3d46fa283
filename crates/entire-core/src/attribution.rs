//! Agent/human line attribution.
//!
//! A commit's additions are divided between the agent and the human using
//! a three-way diff with pinned base points: `B` (the base user commit),
//! `S` (the last shadow snapshot before the commit), and `U` (the new user
//! commit), combined with the per-prompt ledger of human edits captured at
//! each prompt submission. Snapshots include whatever human edits were in
//! the worktree when they were taken, so the ledger is the only place
//! those edits are observable.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use similar::{DiffOp, TextDiff};
use std::collections::{BTreeMap, BTreeSet};

/// Frozen attribution summary for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub agent_lines: u64,
    pub human_added: u64,
    pub human_modified: u64,
    pub human_removed: u64,
    pub total_committed: u64,
    pub agent_percentage: f64,
}

/// One per-prompt ledger entry: human edits observed between the previous
/// snapshot and a prompt submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptAttribution {
    pub prompt_index: u32,
    pub files_touched: Vec<String>,
    pub lines_added_by_human: u64,
}

/// File content as seen by the attribution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Text(String),
    Binary,
}

/// A tree flattened to `path -> content`.
pub type FileSet = BTreeMap<String, FileContent>;

/// Classify raw bytes: anything containing a NUL byte counts as binary,
/// everything else is decoded as (lossy) UTF-8 text.
pub fn file_content_from_bytes(bytes: &[u8]) -> FileContent {
    if bytes.contains(&0) {
        FileContent::Binary
    } else {
        FileContent::Text(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Digest of a file set, for cheap "anything changed?" checks.
pub fn file_set_digest(files: &FileSet) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        match content {
            FileContent::Text(text) => hasher.update(text.as_bytes()),
            FileContent::Binary => hasher.update(b"\0binary\0"),
        }
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Per-file line accounting between the three trees.
#[derive(Default)]
struct FileTally {
    agent_surviving: u64,
    human_added_tail: u64,
    human_modified: u64,
    human_removed: u64,
}

/// Paths that are exact-content renames between two file sets: the old
/// path disappeared, a new path appeared, and the (normalised) text is
/// identical. Renames without content change contribute nothing.
fn rename_pairs(old: &FileSet, new: &FileSet) -> BTreeSet<String> {
    let mut removed: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for (path, content) in old {
        if !new.contains_key(path) {
            if let FileContent::Text(text) = content {
                removed.entry(text.as_str()).or_default().push(path);
            }
        }
    }
    let mut skip = BTreeSet::new();
    for (path, content) in new {
        if old.contains_key(path) {
            continue;
        }
        let FileContent::Text(text) = content else {
            continue;
        };
        if let Some(candidates) = removed.get_mut(text.as_str()) {
            if let Some(old_path) = candidates.pop() {
                skip.insert(old_path.clone());
                skip.insert(path.clone());
            }
        }
    }
    skip
}

fn lines_of(files: &FileSet, path: &str) -> Option<String> {
    match files.get(path) {
        Some(FileContent::Text(text)) => Some(normalize(text)),
        Some(FileContent::Binary) => None,
        None => Some(String::new()),
    }
}

/// Indices (in the new text) of lines inserted by the `old -> new` diff.
fn inserted_line_indices(old: &str, new: &str) -> BTreeSet<usize> {
    let diff = TextDiff::from_lines(old, new);
    let mut inserted = BTreeSet::new();
    for op in diff.ops() {
        match op {
            DiffOp::Insert {
                new_index, new_len, ..
            }
            | DiffOp::Replace {
                new_index, new_len, ..
            } => {
                for i in *new_index..new_index + new_len {
                    inserted.insert(i);
                }
            }
            _ => {}
        }
    }
    inserted
}

fn tally_file(base: &str, shadow: &str, user: &str) -> FileTally {
    let mut tally = FileTally::default();

    // Lines the agent's snapshots introduced relative to the base,
    // indexed by their position in the snapshot text.
    let agent_idx = inserted_line_indices(base, shadow);

    // The uncondensed tail: the user's edits after the last snapshot.
    let diff_su = TextDiff::from_lines(shadow, user);
    let mut surviving = agent_idx.len() as u64;
    for op in diff_su.ops() {
        match op {
            DiffOp::Insert { new_len, .. } => {
                tally.human_added_tail += *new_len as u64;
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_len,
                ..
            } => {
                tally.human_added_tail += *new_len as u64;
                for i in *old_index..old_index + old_len {
                    if agent_idx.contains(&i) {
                        // Agent work overwritten by the human.
                        tally.human_modified += 1;
                        surviving = surviving.saturating_sub(1);
                    } else {
                        tally.human_removed += 1;
                    }
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for i in *old_index..old_index + old_len {
                    if agent_idx.contains(&i) {
                        surviving = surviving.saturating_sub(1);
                    } else {
                        tally.human_removed += 1;
                    }
                }
            }
            DiffOp::Equal { .. } => {}
        }
    }

    tally.agent_surviving = surviving;
    tally
}

/// Compute the attribution for one commit.
///
/// `base`, `shadow`, and `user` are the flattened trees of the base
/// commit, the last shadow snapshot, and the new user commit (snapshot
/// overlay paths already excluded). `ledger` is the per-prompt record of
/// human additions between prompts.
pub fn compute(
    base: &FileSet,
    shadow: &FileSet,
    user: &FileSet,
    ledger: &[PromptAttribution],
) -> Attribution {
    let mut skip = rename_pairs(shadow, user);
    skip.extend(rename_pairs(base, shadow));

    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(base.keys());
    paths.extend(shadow.keys());
    paths.extend(user.keys());

    let mut agent_surviving = 0u64;
    let mut human_added_tail = 0u64;
    let mut human_modified = 0u64;
    let mut human_removed = 0u64;

    for path in paths {
        if skip.contains(path.as_str()) {
            continue;
        }
        // Binary on any side: the file contributes nothing.
        let (Some(b), Some(s), Some(u)) = (
            lines_of(base, path),
            lines_of(shadow, path),
            lines_of(user, path),
        ) else {
            continue;
        };
        let tally = tally_file(&b, &s, &u);
        agent_surviving += tally.agent_surviving;
        human_added_tail += tally.human_added_tail;
        human_modified += tally.human_modified;
        human_removed += tally.human_removed;
    }

    let ledger_added: u64 = ledger.iter().map(|p| p.lines_added_by_human).sum();

    // Snapshots contain the human's between-prompt edits, so those lines
    // show up inside the base->snapshot insertions and must be moved from
    // the agent's column to the human's.
    let agent_lines = agent_surviving.saturating_sub(ledger_added);
    let human_added = ledger_added + human_added_tail;

    finish(agent_lines, human_added, human_modified, human_removed)
}

fn finish(
    agent_lines: u64,
    human_added: u64,
    human_modified: u64,
    human_removed: u64,
) -> Attribution {
    // Deletion-only commits report zero by convention.
    let total_committed = agent_lines + human_added;
    let agent_percentage = if total_committed == 0 {
        0.0
    } else {
        round_one_half_even(100.0 * agent_lines as f64 / total_committed as f64)
    };
    Attribution {
        agent_lines,
        human_added,
        human_modified,
        human_removed,
        total_committed,
        agent_percentage,
    }
}

/// Round to one decimal place, ties to even.
fn round_one_half_even(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Count lines inserted going `old -> new`, with the touched files.
/// Used to capture the per-prompt human ledger at prompt submission.
pub fn count_added_lines(old: &FileSet, new: &FileSet) -> (u64, Vec<String>) {
    let skip = rename_pairs(old, new);

    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(old.keys());
    paths.extend(new.keys());

    let mut total = 0u64;
    let mut touched = Vec::new();
    for path in paths {
        if skip.contains(path.as_str()) {
            continue;
        }
        let (Some(o), Some(n)) = (lines_of(old, path), lines_of(new, path)) else {
            continue;
        };
        let added = inserted_line_indices(&o, &n).len() as u64;
        if added > 0 {
            total += added;
            touched.push(path.clone());
        }
    }
    (total, touched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FileContent {
        FileContent::Text(s.to_string())
    }

    fn set(entries: &[(&str, &str)]) -> FileSet {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), text(c)))
            .collect()
    }

    #[test]
    fn interleaved_human_edits() {
        // Base: one line. Agent writes a function, the human inserts five
        // comment lines (captured by the ledger), the agent adds another
        // function, then the user commits the snapshot state verbatim.
        let base = set(&[("main.go", "package main\n")]);
        let snapshot_content = "package main\n\nfunc agentFunc() {\n\treturn 42\n}\n\
             // User comment 1\n// User comment 2\n// User comment 3\n\
             // User comment 4\n// User comment 5\n\
             \nfunc agentFunc2() {\n\treturn 100\n}\n";
        let shadow = set(&[("main.go", snapshot_content)]);
        let user = shadow.clone();
        let ledger = vec![PromptAttribution {
            prompt_index: 1,
            files_touched: vec!["main.go".to_string()],
            lines_added_by_human: 5,
        }];

        let attr = compute(&base, &shadow, &user, &ledger);
        assert_eq!(attr.human_added, 5);
        assert!(attr.agent_lines > 0);
        assert!(attr.total_committed > 0);
        assert!(attr.agent_percentage > 0.0 && attr.agent_percentage < 100.0);
        assert_eq!(attr.total_committed, attr.agent_lines + attr.human_added);
    }

    #[test]
    fn deletion_only_commit() {
        // Agent removes one function, the human removes the remaining two
        // plus a blank line. Nobody adds anything.
        let base = set(&[(
            "main.go",
            "package main\n\nfunc oldFunc1() {}\nfunc oldFunc2() {}\nfunc oldFunc3() {}\n",
        )]);
        let shadow = set(&[(
            "main.go",
            "package main\n\nfunc oldFunc2() {}\nfunc oldFunc3() {}\n",
        )]);
        let user = set(&[("main.go", "package main\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 0);
        assert_eq!(attr.human_added, 0);
        assert_eq!(attr.human_removed, 3);
        assert_eq!(attr.total_committed, 0);
        assert_eq!(attr.agent_percentage, 0.0);
    }

    #[test]
    fn human_overwrites_agent_lines() {
        let base = set(&[("a.txt", "one\n")]);
        let shadow = set(&[("a.txt", "one\nagent line\n")]);
        let user = set(&[("a.txt", "one\nhuman rewrite\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 0);
        assert_eq!(attr.human_modified, 1);
        assert_eq!(attr.human_added, 1);
        assert_eq!(attr.human_removed, 0);
    }

    #[test]
    fn tail_edits_after_last_snapshot_are_human() {
        let base = set(&[("a.txt", "one\n")]);
        let shadow = set(&[("a.txt", "one\nagent line\n")]);
        let user = set(&[("a.txt", "one\nagent line\nhuman tail\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 1);
        assert_eq!(attr.human_added, 1);
        assert_eq!(attr.total_committed, 2);
        assert_eq!(attr.agent_percentage, 50.0);
    }

    #[test]
    fn agent_line_deleted_before_commit_does_not_count() {
        let base = set(&[("a.txt", "one\n")]);
        let shadow = set(&[("a.txt", "one\nagent line\n")]);
        let user = set(&[("a.txt", "one\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 0);
        assert_eq!(attr.human_removed, 0);
        assert_eq!(attr.total_committed, 0);
        assert_eq!(attr.agent_percentage, 0.0);
    }

    #[test]
    fn binary_files_contribute_nothing() {
        let mut base = FileSet::new();
        base.insert("img.png".to_string(), FileContent::Binary);
        let mut shadow = base.clone();
        shadow.insert("img.png".to_string(), FileContent::Binary);
        let user = shadow.clone();

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.total_committed, 0);
    }

    #[test]
    fn exact_rename_contributes_nothing() {
        let base = set(&[("old.rs", "fn main() {}\n")]);
        let shadow = set(&[("old.rs", "fn main() {}\n")]);
        let user = set(&[("new.rs", "fn main() {}\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 0);
        assert_eq!(attr.human_added, 0);
        assert_eq!(attr.human_removed, 0);
        assert_eq!(attr.total_committed, 0);
    }

    #[test]
    fn crlf_is_normalised_before_counting() {
        let base = set(&[("a.txt", "one\r\n")]);
        let shadow = set(&[("a.txt", "one\r\nagent\r\n")]);
        let user = set(&[("a.txt", "one\nagent\n")]);

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 1);
        assert_eq!(attr.human_added, 0);
        assert_eq!(attr.human_removed, 0);
    }

    #[test]
    fn new_file_from_agent() {
        let base = FileSet::new();
        let shadow = set(&[("lib.rs", "a\nb\nc\n")]);
        let user = shadow.clone();

        let attr = compute(&base, &shadow, &user, &[]);
        assert_eq!(attr.agent_lines, 3);
        assert_eq!(attr.total_committed, 3);
        assert_eq!(attr.agent_percentage, 100.0);
    }

    #[test]
    fn percentage_rounds_half_even() {
        assert_eq!(round_one_half_even(61.538_461), 61.5);
        // 2.5 is exact in binary, so the tie genuinely lands on .5
        assert_eq!(round_one_half_even(0.25), 0.2);
        // 8 of 13 lines
        let attr = finish(8, 5, 0, 0);
        assert_eq!(attr.agent_percentage, 61.5);
    }

    #[test]
    fn ledger_never_drives_agent_negative() {
        let base = set(&[("a.txt", "one\n")]);
        let shadow = set(&[("a.txt", "one\ntwo\n")]);
        let user = shadow.clone();
        let ledger = vec![PromptAttribution {
            prompt_index: 1,
            files_touched: vec!["a.txt".to_string()],
            lines_added_by_human: 10,
        }];

        let attr = compute(&base, &shadow, &user, &ledger);
        assert_eq!(attr.agent_lines, 0);
        assert_eq!(attr.human_added, 10);
    }

    #[test]
    fn count_added_lines_reports_touched_files() {
        let old = set(&[("a.txt", "one\n"), ("b.txt", "x\n")]);
        let new = set(&[("a.txt", "one\ntwo\nthree\n"), ("b.txt", "x\n")]);
        let (added, touched) = count_added_lines(&old, &new);
        assert_eq!(added, 2);
        assert_eq!(touched, vec!["a.txt".to_string()]);
    }

    #[test]
    fn file_set_digest_changes_with_content() {
        let a = set(&[("a.txt", "one\n")]);
        let b = set(&[("a.txt", "two\n")]);
        assert_ne!(file_set_digest(&a), file_set_digest(&b));
        assert_eq!(file_set_digest(&a), file_set_digest(&a.clone()));
    }
}
