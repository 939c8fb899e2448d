//! TOML configuration file loading
//!
//! Supports `~/.config/voxloop/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay under the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoxloopConfigFile {
    /// Completion service configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Audio file locations
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "llama3-8b-8192")
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "local" (default) or "remote"
    pub backend: Option<String>,

    /// Remote transcription model (e.g. "whisper-large-v3")
    pub model: Option<String>,

    /// OpenAI-compatible API base URL for transcription
    pub base_url: Option<String>,

    /// Path to a ggml Whisper model for the local backend
    pub whisper_model_path: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "espeak" or "openai"
    pub engine: Option<String>,

    /// espeak binary name or path
    pub espeak_binary: Option<String>,

    /// `OpenAI` TTS model (e.g. "tts-1")
    pub model: Option<String>,

    /// `OpenAI` TTS voice (e.g. "alloy")
    pub voice: Option<String>,
}

/// Audio file locations
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Directory published audio is copied into
    pub public_dir: Option<String>,

    /// URL path the public directory is served under
    pub url_prefix: Option<String>,

    /// Directory for transient capture/synthesis files
    pub scratch_dir: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub groq: Option<String>,
    pub openai: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,

    /// Static web UI directory served as fallback
    pub static_dir: Option<String>,

    /// Sweep published audio on this interval (seconds); unset disables the timer
    pub sweep_interval_secs: Option<u64>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `VoxloopConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> VoxloopConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return VoxloopConfigFile::default();
    };

    if !path.exists() {
        return VoxloopConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoxloopConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoxloopConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voxloop/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voxloop").join("config.toml"))
}
