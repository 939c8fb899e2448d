//! voxloop - turn-based voice conversation orchestrator
//!
//! One turn records a spoken utterance, transcribes it, asks a language model for a
//! reply, speaks the reply and hands back both text and an audio URL.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │             HTTP shell (api) │ CLI (main)            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Orchestrator (turn)                   │
//! │  capture → stt → command → dialogue → sanitize → tts │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │  Microphone │ Whisper │ Groq completions │ espeak-ng │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod command;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod sanitize;
pub mod session;
pub mod stt;
pub mod tts;
pub mod turn;

pub use config::Config;
pub use dialogue::{ConversationHistory, Dialogue, Message, Role};
pub use error::{Error, Result};
pub use session::{SessionId, SessionStore};
pub use turn::{Greeting, Orchestrator, Stages, TurnResult, TurnState};
