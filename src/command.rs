//! Conversation-ending commands
//!
//! Matching is substring containment, not whole-word: "please stop conversation
//! now" stops, and so does "nonstop music" or "exiting".

/// Phrases that end the conversation
pub const STOP_COMMANDS: &[&str] = &[
    "stop",
    "exit",
    "quit",
    "byebye",
    "stop conversation",
    "end conversation",
];

/// Acknowledgement returned (as text only) when a stop command is heard
pub const STOP_REPLY: &str = "Conversation stopped.";

/// Return the first stop phrase contained in `transcript`, if any
///
/// `transcript` is expected to be normalized (lowercase) already.
#[must_use]
pub fn matched_stop_command(transcript: &str) -> Option<&'static str> {
    STOP_COMMANDS
        .iter()
        .copied()
        .find(|cmd| transcript.contains(cmd))
}

/// Whether `transcript` contains any stop phrase
#[must_use]
pub fn is_stop_command(transcript: &str) -> bool {
    matched_stop_command(transcript).is_some()
}
