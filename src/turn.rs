//! Conversation turn pipeline
//!
//! One turn: record a clip, transcribe it, check for a stop command, ask the
//! language model, sanitize and synthesize the reply, publish the audio.
//! Every failure is caught here and reported as [`TurnResult::Failed`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::audio::{
    AudioPublisher, AudioScratch, AudioSource, Microphone, PublishKind, RECORD_DURATION,
    SAMPLE_RATE, capture_to,
};
use crate::command::{STOP_REPLY, matched_stop_command};
use crate::config::{Config, SttBackend};
use crate::dialogue::{ConversationHistory, Dialogue, GroqClient};
use crate::sanitize::clean_for_tts;
use crate::session::{SessionId, SessionStore};
use crate::stt::{RemoteWhisper, Transcriber, is_valid_text, transcribe_clip};
use crate::tts::{Synthesizer, engine_from_config};
use crate::{Error, Result};

/// Reply when the transcript is too short to act on
pub const REJECTED_REPLY: &str = "I didn't hear anything clear. Please try again.";

/// `user_text` placeholder for a rejected transcript
pub const UNRECOGNIZED_INPUT: &str = "[unrecognized input]";

/// Fixed greeting text
pub const GREETING_TEXT: &str = "Hello dear, how can I assist you?";

/// Where a turn is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Recording,
    Transcribing,
    Rejected,
    Stopped,
    AwaitingCompletion,
    Synthesizing,
    Done,
    Failed,
}

impl TurnState {
    /// Whether the turn has finished in this state
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Stopped | Self::Done | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Transcribing => "transcribing",
            Self::Rejected => "rejected",
            Self::Stopped => "stopped",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    /// Reply spoken; the conversation goes on
    Continue {
        reply: String,
        user_text: String,
        audio_url: String,
    },
    /// A stop command was heard
    Stopped { reply: String, user_text: String },
    /// Transcript too short; `user_text` is always [`UNRECOGNIZED_INPUT`]
    Rejected { reason: String, user_text: String },
    /// Some stage failed
    Failed { error: String },
}

impl TurnResult {
    fn rejected() -> Self {
        Self::Rejected {
            reason: REJECTED_REPLY.to_string(),
            user_text: UNRECOGNIZED_INPUT.to_string(),
        }
    }

    /// Whether the caller should end the conversation loop
    #[must_use]
    pub const fn should_stop(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Wire shape shared by all variants
#[derive(Serialize)]
struct TurnBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    should_stop: bool,
}

impl Serialize for TurnResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let body = match self {
            Self::Continue {
                reply,
                user_text,
                audio_url,
            } => TurnBody {
                reply: Some(reply),
                user_text: Some(user_text),
                audio_url: Some(audio_url),
                error: None,
                should_stop: false,
            },
            Self::Stopped { reply, user_text } => TurnBody {
                reply: Some(reply),
                user_text: Some(user_text),
                audio_url: None,
                error: None,
                should_stop: true,
            },
            Self::Rejected { reason, user_text } => TurnBody {
                reply: Some(reason),
                user_text: Some(user_text),
                audio_url: None,
                error: None,
                should_stop: false,
            },
            Self::Failed { error } => TurnBody {
                reply: None,
                user_text: None,
                audio_url: None,
                error: Some(error),
                should_stop: false,
            },
        };
        body.serialize(serializer)
    }
}

/// Spoken greeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Greeting {
    pub reply: String,
    pub audio_url: String,
}

/// The collaborators a turn runs through
pub struct Stages {
    pub source: Arc<dyn AudioSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub dialogue: Dialogue,
    pub synthesizer: Synthesizer,
    pub scratch: AudioScratch,
    pub publisher: AudioPublisher,
}

/// Logs state transitions for one turn
struct Progress {
    state: TurnState,
}

impl Progress {
    const fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    fn advance(&mut self, next: TurnState) {
        tracing::debug!(from = %self.state, to = %next, "turn state");
        self.state = next;
    }
}

/// Runs conversation turns against a set of sessions
///
/// Methods take `&mut self`; callers serialize access (the HTTP shell holds the
/// orchestrator behind a mutex).
pub struct Orchestrator {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    dialogue: Dialogue,
    synthesizer: Synthesizer,
    scratch: AudioScratch,
    publisher: AudioPublisher,
    sessions: SessionStore,
    record_duration: Duration,
    sample_rate: u32,
    last_state: TurnState,
}

impl Orchestrator {
    #[must_use]
    pub fn new(stages: Stages) -> Self {
        Self {
            source: stages.source,
            transcriber: stages.transcriber,
            dialogue: stages.dialogue,
            synthesizer: stages.synthesizer,
            scratch: stages.scratch,
            publisher: stages.publisher,
            sessions: SessionStore::new(),
            record_duration: RECORD_DURATION,
            sample_rate: SAMPLE_RATE,
            last_state: TurnState::Idle,
        }
    }

    /// Wire up the real microphone, transcriber, completion client and speech engine
    ///
    /// # Errors
    ///
    /// Returns error if a backend cannot be set up or a directory cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let transcriber: Arc<dyn Transcriber> = match config.stt.backend {
            SttBackend::Remote => Arc::new(RemoteWhisper::new(
                reveal(&config.stt.api_key),
                config.stt.base_url.clone(),
                config.stt.model.clone(),
            )?),
            SttBackend::Local => local_transcriber(config)?,
        };

        let completion = GroqClient::new(reveal(&config.llm.api_key), &config.llm.base_url)?;
        let engine = engine_from_config(&config.tts)?;

        tracing::info!(
            stt = transcriber.name(),
            tts = engine.name(),
            model = %config.llm.model,
            "turn pipeline ready"
        );

        Ok(Self::new(Stages {
            source: Arc::new(Microphone::new()),
            transcriber,
            dialogue: Dialogue::new(Arc::new(completion), config.llm.model.clone()),
            synthesizer: Synthesizer::new(engine),
            scratch: AudioScratch::new(&config.audio.scratch_dir)?,
            publisher: AudioPublisher::new(&config.audio.public_dir, config.audio.url_prefix.clone())?,
        }))
    }

    /// Override the recording length and rate
    #[must_use]
    pub fn with_capture(mut self, duration: Duration, sample_rate: u32) -> Self {
        self.record_duration = duration;
        self.sample_rate = sample_rate;
        self
    }

    /// Final state of the most recent turn
    #[must_use]
    pub const fn last_state(&self) -> TurnState {
        self.last_state
    }

    #[must_use]
    pub const fn publisher(&self) -> &AudioPublisher {
        &self.publisher
    }

    /// History of `session`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session
    pub fn history(&self, session: &SessionId) -> Result<&ConversationHistory> {
        self.sessions.get(session)
    }

    /// Start a session with a fresh history if it is not open yet
    pub fn open_session(&mut self, session: SessionId) {
        self.sessions.open(session);
    }

    /// End a session; the default session is reset rather than removed
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session
    pub fn close_session(&mut self, session: &SessionId) -> Result<()> {
        self.sessions.close(session)?;
        tracing::info!(session = %session, "session closed");
        Ok(())
    }

    /// Run one full turn for `session`
    ///
    /// Never fails: errors become [`TurnResult::Failed`]. Scratch audio acquired
    /// during the turn is gone by the time this returns.
    pub async fn run_turn(&mut self, session: &SessionId) -> TurnResult {
        let mut progress = Progress::new();

        let result = match self.try_turn(session, &mut progress).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, state = %progress.state, session = %session, "turn failed");
                progress.advance(TurnState::Failed);
                TurnResult::Failed {
                    error: format!("turn failed: {e}"),
                }
            }
        };

        self.last_state = progress.state;
        result
    }

    async fn try_turn(&mut self, session: &SessionId, progress: &mut Progress) -> Result<TurnResult> {
        self.sessions.get(session)?;

        progress.advance(TurnState::Recording);
        let input = self.scratch.acquire();
        let source = Arc::clone(&self.source);
        let path = input.path().to_path_buf();
        let (duration, rate) = (self.record_duration, self.sample_rate);
        tokio::task::spawn_blocking(move || capture_to(source.as_ref(), &path, duration, rate))
            .await
            .map_err(|e| Error::Device(format!("capture task failed: {e}")))??;

        progress.advance(TurnState::Transcribing);
        let transcript = transcribe_clip(self.transcriber.as_ref(), input.path()).await?;

        if !is_valid_text(&transcript) {
            tracing::info!(transcript = %transcript, "transcript rejected");
            progress.advance(TurnState::Rejected);
            return Ok(TurnResult::rejected());
        }

        if let Some(command) = matched_stop_command(&transcript) {
            tracing::info!(command, "stop command received");
            progress.advance(TurnState::Stopped);
            return Ok(TurnResult::Stopped {
                reply: STOP_REPLY.to_string(),
                user_text: transcript,
            });
        }

        progress.advance(TurnState::AwaitingCompletion);
        let history = self.sessions.get_mut(session)?;
        let reply = self.dialogue.respond(history, &transcript).await?;

        progress.advance(TurnState::Synthesizing);
        let spoken = clean_for_tts(&reply);
        let published = self
            .synthesizer
            .speak(&spoken, &self.scratch, &self.publisher, PublishKind::Response)
            .await?;

        input.release();
        progress.advance(TurnState::Done);

        Ok(TurnResult::Continue {
            reply,
            user_text: transcript,
            audio_url: published.url,
        })
    }

    /// Clear the history of `session` back to the system prompt
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session
    pub fn reset(&mut self, session: &SessionId) -> Result<()> {
        self.sessions.get_mut(session)?.reset();
        tracing::info!(session = %session, "conversation reset");
        Ok(())
    }

    /// Speak the fixed greeting
    ///
    /// The returned text is unmodified; only the synthesized copy is sanitized.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or publishing fails
    pub async fn greeting(&self) -> Result<Greeting> {
        let spoken = clean_for_tts(GREETING_TEXT);
        let published = self
            .synthesizer
            .speak(&spoken, &self.scratch, &self.publisher, PublishKind::Greeting)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "greeting failed"))?;

        Ok(Greeting {
            reply: GREETING_TEXT.to_string(),
            audio_url: published.url,
        })
    }

    /// Delete every published audio file, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns error if the public directory cannot be listed
    pub fn sweep(&self) -> Result<usize> {
        self.publisher.sweep()
    }
}

/// Fresh copy of a secret for a client that takes ownership
fn reveal(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

#[cfg(feature = "whisper")]
fn local_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    Ok(Arc::new(crate::stt::LocalWhisper::new(
        &config.stt.whisper_model_path,
    )?))
}

#[cfg(not(feature = "whisper"))]
fn local_transcriber(_config: &Config) -> Result<Arc<dyn Transcriber>> {
    Err(Error::Config(
        "local STT backend requires building with the `whisper` feature".to_string(),
    ))
}
