//! Speech-to-text (STT) processing
//!
//! A [`Transcriber`] turns a recorded WAV clip into raw text. [`transcribe_clip`]
//! normalizes it (trimmed, lowercase) for the rest of the turn, and
//! [`is_valid_text`] decides whether there is enough of it to act on.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Minimum number of word tokens for a transcript to be acted on
pub const MIN_WORDS: usize = 2;

/// Word tokens: runs of word characters between word boundaries
static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("valid regex"));

/// Converts a recorded clip into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the WAV file at `path`, returning the raw transcript
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    async fn transcribe(&self, path: &Path) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Transcribe `path` and normalize the result: trimmed and lowercased
///
/// # Errors
///
/// Returns error if the backend fails
pub async fn transcribe_clip(transcriber: &dyn Transcriber, path: &Path) -> Result<String> {
    let raw = transcriber.transcribe(path).await?;
    let text = normalize_transcript(&raw);
    tracing::info!(backend = transcriber.name(), transcript = %text, "transcribed");
    Ok(text)
}

/// Trim surrounding whitespace and lowercase
#[must_use]
pub fn normalize_transcript(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Count word tokens in `text`
#[must_use]
pub fn word_count(text: &str) -> usize {
    WORD_REGEX.find_iter(text).count()
}

/// Whether `text` has at least [`MIN_WORDS`] word tokens
///
/// Empty, single-word and punctuation-only transcripts are rejected.
#[must_use]
pub fn is_valid_text(text: &str) -> bool {
    word_count(text) >= MIN_WORDS
}

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Whisper over an OpenAI-compatible `/audio/transcriptions` endpoint (Groq by default)
pub struct RemoteWhisper {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl RemoteWhisper {
    /// Create a new remote transcriber
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "API key required for remote transcription".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl Transcriber for RemoteWhisper {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let audio = tokio::fs::read(path).await?;
        tracing::debug!(audio_bytes = audio.len(), model = %self.model, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", "en");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Transcription(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse response: {e}")))?;

        Ok(result.text)
    }

    fn name(&self) -> &'static str {
        "remote-whisper"
    }
}

#[cfg(feature = "whisper")]
mod local {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use whisper_rs::{
        FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    };

    use super::Transcriber;
    use crate::audio::{read_wav, resample};
    use crate::{Error, Result};

    /// Sample rate Whisper models expect
    const WHISPER_SAMPLE_RATE: u32 = 16000;

    /// On-device Whisper (whisper.cpp), English, full precision on the CPU
    pub struct LocalWhisper {
        // Keeps the model alive for the state
        _context: WhisperContext,
        state: Arc<Mutex<WhisperState>>,
    }

    impl LocalWhisper {
        /// Load a ggml model (e.g. `ggml-small.bin`)
        ///
        /// # Errors
        ///
        /// Returns error if the model cannot be loaded
        pub fn new(model_path: &Path) -> Result<Self> {
            let path = model_path
                .to_str()
                .ok_or_else(|| Error::Config("whisper model path is not UTF-8".to_string()))?;

            let mut params = WhisperContextParameters::default();
            params.use_gpu(false);

            let context = WhisperContext::new_with_params(path, params)
                .map_err(|e| Error::Transcription(format!("Whisper load failed: {e}")))?;
            let state = context
                .create_state()
                .map_err(|e| Error::Transcription(format!("Whisper state init failed: {e}")))?;

            tracing::info!(model = %model_path.display(), "loaded local Whisper model");

            Ok(Self {
                _context: context,
                state: Arc::new(Mutex::new(state)),
            })
        }
    }

    #[async_trait]
    impl Transcriber for LocalWhisper {
        async fn transcribe(&self, path: &Path) -> Result<String> {
            let path = path.to_path_buf();
            let state = Arc::clone(&self.state);

            tokio::task::spawn_blocking(move || {
                let (samples, rate) = read_wav(&path)?;
                let samples = resample(&samples, rate, WHISPER_SAMPLE_RATE)?;

                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_language(Some("en"));
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_no_timestamps(true);

                let mut state = state
                    .lock()
                    .map_err(|e| Error::Transcription(format!("Whisper lock poisoned: {e}")))?;
                state
                    .full(params, &samples)
                    .map_err(|e| Error::Transcription(format!("Whisper inference failed: {e}")))?;

                let text = state
                    .as_iter()
                    .filter_map(|segment| segment.to_str().ok().map(str::to_string))
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(text)
            })
            .await
            .map_err(|e| Error::Transcription(format!("Whisper task failed: {e}")))?
        }

        fn name(&self) -> &'static str {
            "local-whisper"
        }
    }
}

#[cfg(feature = "whisper")]
pub use local::LocalWhisper;
