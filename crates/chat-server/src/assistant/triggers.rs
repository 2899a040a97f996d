//! Assistant trigger detection and stripping.
//!
//! Pure text predicates: a message is assistant-directed when its
//! lowercased, trimmed text starts with or contains an entry from the fixed
//! trigger vocabulary. Leading mention/greeting triggers are stripped to
//! produce the prompt payload.

/// Full trigger vocabulary: mentions, greetings, and command verbs.
const TRIGGERS: &[&str] = &[
    "@ai",
    "@assistant",
    "hey ai",
    "hey assistant",
    "ai help",
    "ai:",
    "assistant:",
    "ai ",
    "assistant ",
    "summarize",
    "explain",
    "help me",
    "translate",
    "brainstorm",
];

/// Triggers that are stripped from the front of a message. Command verbs
/// stay in the payload; only mention and greeting prefixes are removed.
const PREFIX_TRIGGERS: &[&str] = &[
    "@ai",
    "@assistant",
    "hey ai",
    "hey assistant",
    "ai help",
    "ai:",
    "assistant:",
    "ai ",
    "assistant ",
];

/// Whether a message is directed at the assistant.
pub fn is_assistant_directed(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    TRIGGERS
        .iter()
        .any(|t| lower.starts_with(t) || lower.contains(t))
}

/// Strip one leading trigger phrase to produce the generation payload.
///
/// Falls back to the original (trimmed) text when stripping would leave an
/// empty prompt.
pub fn strip_trigger(text: &str) -> String {
    let trimmed = text.trim();

    for trigger in PREFIX_TRIGGERS {
        if let Some(len) = ci_prefix_len(trimmed, trigger) {
            let stripped = trimmed[len..].trim();
            if stripped.is_empty() {
                return trimmed.to_string();
            }
            return stripped.to_string();
        }
    }

    trimmed.to_string()
}

/// Byte length of `trigger` matched case-insensitively at the start of
/// `text`. Measured on the original text, char by char: lowercasing the
/// whole string can change byte offsets (e.g. `İ` lowercases to two chars),
/// so a length taken from the lowercased copy is not a valid slice point.
fn ci_prefix_len(text: &str, trigger: &str) -> Option<usize> {
    let mut trigger_chars = trigger.chars();
    let mut len = 0;

    for c in text.chars() {
        let Some(t) = trigger_chars.next() else {
            break;
        };
        if !c.to_lowercase().eq(t.to_lowercase()) {
            return None;
        }
        len += c.len_utf8();
    }

    if trigger_chars.next().is_none() {
        Some(len)
    } else {
        None
    }
}

/// Example assistant commands surfaced to the composer UI.
pub fn command_suggestions() -> Vec<&'static str> {
    vec![
        "@ai help - Get help from the assistant",
        "@ai explain [topic] - Get explanations",
        "@ai summarize [text] - Summarize content",
        "@ai translate [text] - Translate text",
        "@ai brainstorm [topic] - Generate ideas",
        "summarize [text] - Summarize any content",
        "explain [topic] - Get explanations",
        "help me with [topic] - Get assistance",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mentions_greetings_and_verbs() {
        assert!(is_assistant_directed("@ai explain recursion"));
        assert!(is_assistant_directed("hey ai summarize this"));
        assert!(is_assistant_directed("can you summarize the plan?"));
        assert!(is_assistant_directed("  Explain closures  "));
    }

    #[test]
    fn ignores_ordinary_chat() {
        assert!(!is_assistant_directed("hello there"));
        assert!(!is_assistant_directed("see you at 5"));
        assert!(!is_assistant_directed(""));
        assert!(!is_assistant_directed("   "));
    }

    #[test]
    fn strips_leading_mention() {
        assert_eq!(strip_trigger("@ai explain recursion"), "explain recursion");
        assert_eq!(strip_trigger("hey ai summarize this"), "summarize this");
        assert_eq!(strip_trigger("AI: translate bonjour"), "translate bonjour");
    }

    #[test]
    fn strips_safely_around_non_ascii_text() {
        // `İ` lowercases to two chars, shifting byte offsets past the
        // mention; stripping must not slice mid-character.
        assert_eq!(strip_trigger("@Aİ hello"), "@Aİ hello");
        assert_eq!(strip_trigger("hey ai çeviri yap"), "çeviri yap");
        assert_eq!(strip_trigger("@AI explique la récursion"), "explique la récursion");
    }

    #[test]
    fn keeps_command_verbs_in_payload() {
        assert_eq!(strip_trigger("summarize the notes"), "summarize the notes");
    }

    #[test]
    fn empty_after_strip_falls_back_to_original() {
        assert_eq!(strip_trigger("@ai"), "@ai");
        assert_eq!(strip_trigger("  @ai  "), "@ai");
    }
}
