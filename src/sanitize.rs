//! Cleanup of reply text before speech synthesis
//!
//! Only the copy sent to the speech engine is sanitized; the text shown to the
//! caller keeps its markup.

/// Characters stripped before synthesis
///
/// `✔️` and `❤️` are a base glyph followed by U+FE0F, so each codepoint is listed.
const DENYLIST: &[char] = &[
    '*', '_', '`', '~', '•', '-', '–', '—', '#', '@', '^', '+', '=', '>', '✓', '✔', '\u{FE0F}',
    '❌', '🔹', '🔸', '🎯', '🚀', '🤖', '🧠', '😊', '😂', '❤', '🔥', '💡', '👉',
];

/// Remove markdown, symbols and emoji unsuitable for speech, then trim
///
/// Idempotent: cleaning already-clean text returns it unchanged.
#[must_use]
pub fn clean_for_tts(text: &str) -> String {
    text.chars()
        .filter(|c| !DENYLIST.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}
