//! Prompt text cleanup for session descriptions and commit subjects.

/// Maximum length of a derived description, in characters.
const DESCRIPTION_MAX_CHARS: usize = 72;

/// Fallback subject used when a prompt cleans down to nothing.
const FALLBACK_DESCRIPTION: &str = "Agent session updates";

/// Conversational prefixes stripped from prompts before use as a subject.
const PROMPT_PREFIXES: &[&str] = &[
    "Can you ",
    "can you ",
    "Please ",
    "please ",
    "Let's ",
    "let's ",
    "Could you ",
    "could you ",
    "Would you ",
    "would you ",
    "I want you to ",
    "I'd like you to ",
    "I need you to ",
];

/// Remove IDE-injected context tags like `<ide_opened_file>...</ide_opened_file>`
/// and `<ide_selection>...</ide_selection>`. These are editor plumbing and
/// must not leak into descriptions or commit messages.
pub fn strip_ide_context_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find("<ide_") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start..];
        // Close of the opening tag, then the matching `</ide_...>` close tag.
        let Some(open_end) = after_open.find('>') else {
            out.push_str(after_open);
            break;
        };
        let Some(close_start) = after_open[open_end..].find("</ide_") else {
            out.push_str(after_open);
            break;
        };
        let close_abs = open_end + close_start;
        let Some(close_end) = after_open[close_abs..].find('>') else {
            out.push_str(after_open);
            break;
        };
        rest = &after_open[close_abs + close_end + 1..];
    }
    out.trim().to_string()
}

/// Clean a user prompt into a one-line subject: strip conversational
/// prefixes (repeatedly, until none match), drop a trailing question mark,
/// cap at 72 characters, and capitalise the first letter.
pub fn clean_prompt(prompt: &str) -> String {
    let mut cleaned = prompt.trim();

    loop {
        let mut found = false;
        for prefix in PROMPT_PREFIXES {
            if let Some(rest) = cleaned.strip_prefix(prefix) {
                cleaned = rest;
                found = true;
                break;
            }
        }
        if !found {
            break;
        }
    }

    let mut cleaned = cleaned.strip_suffix('?').unwrap_or(cleaned).trim().to_string();

    if let Some((idx, _)) = cleaned.char_indices().nth(DESCRIPTION_MAX_CHARS) {
        cleaned.truncate(idx);
        cleaned.truncate(cleaned.trim_end().len());
    }

    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive a session description (also the generated commit subject) from
/// the first prompt.
pub fn description_from_prompt(prompt: &str) -> String {
    let stripped = strip_ide_context_tags(prompt);
    let cleaned = clean_prompt(&stripped);
    if cleaned.is_empty() {
        FALLBACK_DESCRIPTION.to_string()
    } else {
        cleaned
    }
}

/// First line of a string.
pub fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_prefix() {
        assert_eq!(clean_prompt("please fix the tests"), "Fix the tests");
    }

    #[test]
    fn strips_stacked_prefixes() {
        assert_eq!(
            clean_prompt("Can you please fix the login bug?"),
            "Fix the login bug"
        );
    }

    #[test]
    fn caps_at_72_chars() {
        let prompt = "a".repeat(100);
        let cleaned = clean_prompt(&prompt);
        assert_eq!(cleaned.chars().count(), 72);
    }

    #[test]
    fn capitalises_first_letter() {
        assert_eq!(clean_prompt("add a readme"), "Add a readme");
    }

    #[test]
    fn strips_ide_tags() {
        let text = "<ide_opened_file>src/main.rs</ide_opened_file>fix the bug";
        assert_eq!(strip_ide_context_tags(text), "fix the bug");
    }

    #[test]
    fn strips_multiple_ide_tags() {
        let text =
            "<ide_opened_file>a.rs</ide_opened_file>do it<ide_selection>let x = 1;</ide_selection>";
        assert_eq!(strip_ide_context_tags(text), "do it");
    }

    #[test]
    fn unterminated_tag_left_alone() {
        let text = "<ide_opened_file>src/main.rs fix the bug";
        assert_eq!(strip_ide_context_tags(text), text);
    }

    #[test]
    fn description_falls_back_when_empty() {
        assert_eq!(description_from_prompt(""), "Agent session updates");
        assert_eq!(description_from_prompt("   ?  "), "Agent session updates");
    }

    #[test]
    fn description_from_ordinary_prompt() {
        assert_eq!(
            description_from_prompt("could you add error handling to the parser"),
            "Add error handling to the parser"
        );
    }

    #[test]
    fn first_line_of_multiline() {
        assert_eq!(first_line("subject\nbody"), "subject");
        assert_eq!(first_line(""), "");
    }
}
