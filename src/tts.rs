//! Text-to-speech (TTS) processing
//!
//! A [`SpeechEngine`] renders text into a WAV file. [`Synthesizer`] drives an
//! engine, waits for the output to appear and publishes it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::audio::{AudioPublisher, AudioScratch, PublishKind, PublishedAudio};
use crate::config::{DEFAULT_OPENAI_BASE_URL, TtsConfig, TtsEngineKind};
use crate::{Error, Result};

/// Existence checks before giving up on the rendered file
pub const POLL_ATTEMPTS: u32 = 10;

/// Pause between existence checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Renders speech into an audio file
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Render `text` as WAV at `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the engine fails
    async fn render(&self, text: &str, path: &Path) -> Result<()>;

    /// Engine name for logs
    fn name(&self) -> &'static str;
}

/// Build the engine selected in config
///
/// # Errors
///
/// Returns error if the engine cannot be set up (binary missing, no API key)
pub fn engine_from_config(config: &TtsConfig) -> Result<Arc<dyn SpeechEngine>> {
    match config.engine {
        TtsEngineKind::Espeak => Ok(Arc::new(Espeak::new(&config.espeak_binary)?)),
        TtsEngineKind::OpenAi => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?;
            Ok(Arc::new(OpenAiSpeech::new(
                SecretString::from(api_key.expose_secret().to_owned()),
                DEFAULT_OPENAI_BASE_URL,
                config.model.clone(),
                config.voice.clone(),
            )?))
        }
    }
}

/// Offline synthesis with the `espeak-ng` command-line tool
///
/// The process exiting is the completion signal for the output file.
pub struct Espeak {
    binary: PathBuf,
}

impl Espeak {
    /// Speaking rate, words per minute
    pub const RATE_WPM: u32 = 160;

    /// Amplitude (0-200)
    pub const AMPLITUDE: u32 = 200;

    /// Locate `binary` on `PATH` (or accept an explicit path)
    ///
    /// # Errors
    ///
    /// Returns error if the binary cannot be found
    pub fn new(binary: &str) -> Result<Self> {
        let binary = which::which(binary)
            .map_err(|e| Error::Config(format!("speech binary {binary:?} not found: {e}")))?;
        tracing::debug!(binary = %binary.display(), "using espeak");
        Ok(Self { binary })
    }
}

#[async_trait]
impl SpeechEngine for Espeak {
    async fn render(&self, text: &str, path: &Path) -> Result<()> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("-s")
            .arg(Self::RATE_WPM.to_string())
            .arg("-a")
            .arg(Self::AMPLITUDE.to_string())
            .arg("-w")
            .arg(path)
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to run espeak: {e}")))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(code, stderr = %stderr, "espeak failed");
            return Err(Error::Synthesis(format!("espeak exited with code {code}")));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "espeak"
    }
}

/// `OpenAI` speech endpoint, WAV output
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    /// Create a new `OpenAI` speech engine
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, base_url: &str, model: String, voice: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            voice,
        })
    }
}

#[async_trait]
impl SpeechEngine for OpenAiSpeech {
    async fn render(&self, text: &str, path: &Path) -> Result<()> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("OpenAI TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tokio::fs::write(path, &audio).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Runs a [`SpeechEngine`] and waits for its output file
pub struct Synthesizer {
    engine: Arc<dyn SpeechEngine>,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl Synthesizer {
    #[must_use]
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            poll_attempts: POLL_ATTEMPTS,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the existence polling schedule
    #[must_use]
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    /// Render `text` to `path` and wait until the file exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the engine fails, or
    /// [`Error::SynthesisTimeout`] if the file never appears
    pub async fn synthesize(&self, text: &str, path: &Path) -> Result<()> {
        tracing::debug!(engine = self.engine.name(), chars = text.len(), "synthesizing");
        self.engine.render(text, path).await?;
        self.wait_for(path).await
    }

    async fn wait_for(&self, path: &Path) -> Result<()> {
        for attempt in 1..=self.poll_attempts {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(());
            }
            tracing::debug!(attempt, path = %path.display(), "waiting for synthesized audio");
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(Error::SynthesisTimeout {
            path: path.to_path_buf(),
            attempts: self.poll_attempts,
        })
    }

    /// Synthesize into a scratch file and publish a copy
    ///
    /// The scratch file is removed before returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or publishing fails
    pub async fn speak(
        &self,
        text: &str,
        scratch: &AudioScratch,
        publisher: &AudioPublisher,
        kind: PublishKind,
    ) -> Result<PublishedAudio> {
        let output = scratch.acquire();
        self.synthesize(text, output.path()).await?;
        let published = publisher.publish(output.path(), kind).await?;
        output.release();
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Writes a fixed payload, remembering the text it was given
    struct Recording {
        texts: Mutex<Vec<String>>,
        write: bool,
    }

    #[async_trait]
    impl SpeechEngine for Recording {
        async fn render(&self, text: &str, path: &Path) -> Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            if self.write {
                tokio::fs::write(path, b"RIFF").await?;
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn engine(write: bool) -> Arc<Recording> {
        Arc::new(Recording {
            texts: Mutex::new(Vec::new()),
            write,
        })
    }

    #[tokio::test]
    async fn test_speak_publishes_and_cleans_scratch() {
        let scratch_dir = tempfile::tempdir().unwrap();
        let public_dir = tempfile::tempdir().unwrap();
        let scratch = AudioScratch::new(scratch_dir.path()).unwrap();
        let publisher = AudioPublisher::new(public_dir.path(), "/static/audio").unwrap();
        let engine = engine(true);
        let synth = Synthesizer::new(engine.clone());

        let published = synth
            .speak("hello", &scratch, &publisher, PublishKind::Response)
            .await
            .unwrap();

        assert!(published.path.exists());
        assert!(published.url.starts_with("/static/audio/response_"));
        assert_eq!(std::fs::read_dir(scratch_dir.path()).unwrap().count(), 0);
        assert_eq!(*engine.texts.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_output_times_out() {
        let scratch_dir = tempfile::tempdir().unwrap();
        let public_dir = tempfile::tempdir().unwrap();
        let scratch = AudioScratch::new(scratch_dir.path()).unwrap();
        let publisher = AudioPublisher::new(public_dir.path(), "/static/audio").unwrap();
        let synth = Synthesizer::new(engine(false)).with_polling(3, Duration::from_millis(5));

        let err = synth
            .speak("hello", &scratch, &publisher, PublishKind::Greeting)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SynthesisTimeout { attempts: 3, .. }));
        assert_eq!(std::fs::read_dir(public_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_espeak_missing_binary() {
        let result = Espeak::new("definitely-not-a-real-speech-binary");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    /// Executable shell script standing in for espeak
    #[cfg(unix)]
    fn fake_espeak(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-espeak");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_espeak_arguments_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("argv.log");
        let script = fake_espeak(
            dir.path(),
            &format!(
                r#"for a in "$@"; do printf '%s\n' "$a" >> '{}'; done
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-w" ]; then out="$a"; fi
  prev="$a"
done
printf 'RIFF' > "$out""#,
                log.display()
            ),
        );
        let out = dir.path().join("speech.wav");

        let espeak = Espeak::new(script.to_str().unwrap()).unwrap();
        espeak.render("-hello there", &out).await.unwrap();

        let argv = std::fs::read_to_string(&log).unwrap();
        let argv: Vec<&str> = argv.lines().collect();
        let out_arg = out.display().to_string();
        assert_eq!(
            argv,
            vec!["-s", "160", "-a", "200", "-w", out_arg.as_str(), "--", "-hello there"]
        );
        assert_eq!(std::fs::read(&out).unwrap(), b"RIFF");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_espeak_nonzero_exit_is_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_espeak(dir.path(), "echo 'voice not found' >&2\nexit 1");
        let out = dir.path().join("speech.wav");

        let espeak = Espeak::new(script.to_str().unwrap()).unwrap();
        let err = espeak.render("hello there", &out).await.unwrap_err();

        assert!(matches!(err, Error::Synthesis(msg) if msg.contains("code 1")));
        assert!(!out.exists());
    }

    #[test]
    fn test_openai_requires_key() {
        let result = OpenAiSpeech::new(
            SecretString::from(String::new()),
            DEFAULT_OPENAI_BASE_URL,
            "tts-1".to_string(),
            "alloy".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
