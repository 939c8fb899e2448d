//! Configuration management for voxloop
//!
//! Values resolve in order: environment (after `.env` is loaded) → TOML file → defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

pub use file::VoxloopConfigFile;

use crate::{Error, Result};

/// Default OpenAI-compatible base URL for completions and remote transcription (Groq)
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default completion model
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";

/// Default ggml model for on-device transcription
pub const DEFAULT_WHISPER_MODEL_PATH: &str = "models/ggml-small.bin";

/// Default remote transcription model
pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3";

/// Default `OpenAI` base URL for the HTTP speech engine
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// voxloop configuration
#[derive(Debug)]
pub struct Config {
    /// Completion service
    pub llm: LlmConfig,

    /// Speech-to-text
    pub stt: SttConfig,

    /// Text-to-speech
    pub tts: TtsConfig,

    /// Audio file locations
    pub audio: AudioConfig,

    /// HTTP shell
    pub server: ServerConfig,
}

/// Completion service configuration
#[derive(Debug)]
pub struct LlmConfig {
    /// API key (from `GROQ_API_KEY`)
    pub api_key: SecretString,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,
}

/// Which transcription backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    /// On-device Whisper (requires the `whisper` feature, on by default)
    Local,
    /// OpenAI-compatible transcription API
    Remote,
}

impl SttBackend {
    /// Parse a backend name
    ///
    /// # Errors
    ///
    /// Returns error on an unknown backend name
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown STT backend: {other}"))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug)]
pub struct SttConfig {
    pub backend: SttBackend,

    /// Remote model identifier
    pub model: String,

    /// Remote base URL
    pub base_url: String,

    /// Remote API key (shares the completion key by default)
    pub api_key: SecretString,

    /// ggml model path for the local backend
    pub whisper_model_path: PathBuf,
}

/// Which speech engine renders replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngineKind {
    /// Local `espeak-ng` process
    Espeak,
    /// `OpenAI` speech API
    OpenAi,
}

impl TtsEngineKind {
    /// Parse an engine name
    ///
    /// # Errors
    ///
    /// Returns error on an unknown engine name
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS engine: {other}"))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug)]
pub struct TtsConfig {
    pub engine: TtsEngineKind,

    /// espeak binary name or path
    pub espeak_binary: String,

    /// `OpenAI` API key, required for [`TtsEngineKind::OpenAi`]
    pub openai_api_key: Option<SecretString>,

    /// `OpenAI` TTS model
    pub model: String,

    /// `OpenAI` TTS voice
    pub voice: String,
}

/// Audio file locations
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Directory published audio is copied into
    pub public_dir: PathBuf,

    /// URL path the public directory is served under (e.g. "/static/audio")
    pub url_prefix: String,

    /// Directory for transient capture/synthesis files
    pub scratch_dir: PathBuf,
}

/// HTTP shell configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,

    /// Static web UI directory served as fallback
    pub static_dir: Option<PathBuf>,

    /// Periodic sweep of published audio
    pub sweep_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from `.env`, the process environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let file = file::load_config_file(config_path);
        Self::from_sources(&file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if `GROQ_API_KEY` is missing, or a backend needs a setting
    /// that is not present
    pub fn from_sources<F>(file: &VoxloopConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let groq_key = env("GROQ_API_KEY")
            .or_else(|| file.api_keys.groq.clone())
            .ok_or_else(|| Error::Config("missing GROQ_API_KEY".to_string()))?;

        let llm = LlmConfig {
            api_key: SecretString::from(groq_key.clone()),
            base_url: env("VOXLOOP_LLM_BASE_URL")
                .or_else(|| file.llm.base_url.clone())
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            model: env("VOXLOOP_LLM_MODEL")
                .or_else(|| file.llm.model.clone())
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        };

        let stt_backend = env("VOXLOOP_STT_BACKEND")
            .or_else(|| file.stt.backend.clone())
            .map_or(Ok(SttBackend::Local), |s| SttBackend::parse(&s))?;
        let whisper_model_path = env("VOXLOOP_WHISPER_MODEL_PATH")
            .or_else(|| file.stt.whisper_model_path.clone())
            .map_or_else(|| PathBuf::from(DEFAULT_WHISPER_MODEL_PATH), PathBuf::from);
        let stt = SttConfig {
            backend: stt_backend,
            model: env("VOXLOOP_STT_MODEL")
                .or_else(|| file.stt.model.clone())
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            base_url: env("VOXLOOP_STT_BASE_URL")
                .or_else(|| file.stt.base_url.clone())
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            api_key: SecretString::from(groq_key),
            whisper_model_path,
        };

        let engine = env("VOXLOOP_TTS_ENGINE")
            .or_else(|| file.tts.engine.clone())
            .map_or(Ok(TtsEngineKind::Espeak), |s| TtsEngineKind::parse(&s))?;
        let openai_api_key = env("OPENAI_API_KEY")
            .or_else(|| file.api_keys.openai.clone())
            .map(SecretString::from);
        if engine == TtsEngineKind::OpenAi && openai_api_key.is_none() {
            return Err(Error::Config(
                "openai TTS engine requires OPENAI_API_KEY".to_string(),
            ));
        }
        let tts = TtsConfig {
            engine,
            espeak_binary: env("VOXLOOP_ESPEAK_BINARY")
                .or_else(|| file.tts.espeak_binary.clone())
                .unwrap_or_else(|| "espeak-ng".to_string()),
            openai_api_key,
            model: env("VOXLOOP_TTS_MODEL")
                .or_else(|| file.tts.model.clone())
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: env("VOXLOOP_TTS_VOICE")
                .or_else(|| file.tts.voice.clone())
                .unwrap_or_else(|| "alloy".to_string()),
        };

        let url_prefix = env("VOXLOOP_URL_PREFIX")
            .or_else(|| file.audio.url_prefix.clone())
            .map_or_else(|| "/static/audio".to_string(), |p| normalize_url_prefix(&p));
        if url_prefix == "/" {
            return Err(Error::Config(
                "VOXLOOP_URL_PREFIX must not be the site root".to_string(),
            ));
        }
        let audio = AudioConfig {
            public_dir: env("VOXLOOP_PUBLIC_DIR")
                .or_else(|| file.audio.public_dir.clone())
                .map_or_else(|| PathBuf::from("static/audio"), PathBuf::from),
            url_prefix,
            scratch_dir: env("VOXLOOP_SCRATCH_DIR")
                .or_else(|| file.audio.scratch_dir.clone())
                .map_or_else(|| std::env::temp_dir().join("voxloop"), PathBuf::from),
        };

        let port = match env("VOXLOOP_PORT") {
            Some(s) => s
                .parse()
                .map_err(|e| Error::Config(format!("invalid VOXLOOP_PORT {s:?}: {e}")))?,
            None => file.server.port.unwrap_or(5000),
        };
        let sweep_interval = match env("VOXLOOP_SWEEP_INTERVAL_SECS") {
            Some(s) => Some(s.parse::<u64>().map_err(|e| {
                Error::Config(format!("invalid VOXLOOP_SWEEP_INTERVAL_SECS {s:?}: {e}"))
            })?),
            None => file.server.sweep_interval_secs,
        }
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
        let server = ServerConfig {
            port,
            static_dir: env("VOXLOOP_STATIC_DIR")
                .or_else(|| file.server.static_dir.clone())
                .map(PathBuf::from),
            sweep_interval,
        };

        Ok(Self {
            llm,
            stt,
            tts,
            audio,
            server,
        })
    }
}

/// Ensure a URL prefix has a leading slash and no trailing slash
fn normalize_url_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    format!("/{trimmed}")
}
