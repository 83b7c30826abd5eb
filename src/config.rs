//! Configuration file handling for jasoos.
//!
//! Loads configuration from `~/.config/jasoos/config.toml` or a custom path.
//! API keys never live here; they come from the environment (or `.env`).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{Backend, CameraSettings, Resolution};
use crate::voice::{
    ListenSettings, DEFAULT_OUTPUT_FORMAT, DEFAULT_STT_MODEL, DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID,
    ELEVENLABS_API_BASE_URL, GROQ_API_BASE_URL,
};

/// Highest number of device indices probed (indices `0..MAX_PROBE_INDICES`).
pub const MAX_PROBE_INDICES: u32 = 5;

/// Most backends tried per index; with the index bound this caps a probe at 15 opens.
pub const MAX_PROBE_BACKENDS: usize = 3;

/// Longest duration accepted for any `[listen]` setting.
const MAX_LISTEN_SECS: f32 = 600.0;

/// Configuration file structure for jasoos.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub read_attempts: u32,
    pub max_index: u32,
    /// Backend names in probe order; empty means platform defaults
    pub backends: Vec<String>,
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let defaults = CameraSettings::default();
        Self {
            width: defaults.resolution.width,
            height: defaults.resolution.height,
            fps: defaults.fps,
            read_attempts: defaults.read_attempts,
            max_index: defaults.max_index,
            backends: Vec::new(),
            jpeg_quality: defaults.jpeg_quality,
        }
    }
}

impl CameraConfig {
    pub fn settings(&self) -> Result<CameraSettings, ConfigError> {
        let backends = if self.backends.is_empty() {
            Backend::defaults()
        } else {
            self.backends
                .iter()
                .map(|name| name.parse::<Backend>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| ConfigError::Invalid {
                    field: "camera.backends",
                    message,
                })?
        };

        if backends.len() > MAX_PROBE_BACKENDS {
            return Err(ConfigError::Invalid {
                field: "camera.backends",
                message: format!("at most {} backends, got {}", MAX_PROBE_BACKENDS, backends.len()),
            });
        }
        if let Some(repeated) = backends
            .iter()
            .enumerate()
            .find_map(|(i, b)| backends[..i].contains(b).then_some(b))
        {
            return Err(ConfigError::Invalid {
                field: "camera.backends",
                message: format!("'{}' is listed more than once", repeated),
            });
        }
        if !(1..=MAX_PROBE_INDICES).contains(&self.max_index) {
            return Err(ConfigError::Invalid {
                field: "camera.max_index",
                message: format!(
                    "must be between 1 and {}, got {}",
                    MAX_PROBE_INDICES, self.max_index
                ),
            });
        }

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                field: "camera.width/height",
                message: "resolution must be greater than 0".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "camera.jpeg_quality",
                message: format!("must be between 1 and 100, got {}", self.jpeg_quality),
            });
        }

        Ok(CameraSettings {
            resolution: Resolution {
                width: self.width,
                height: self.height,
            },
            fps: self.fps.max(1),
            read_attempts: self.read_attempts.max(1),
            max_index: self.max_index,
            backends,
            jpeg_quality: self.jpeg_quality,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How often the page asks for a new preview frame
    pub frame_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            frame_interval_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub api_key_env: String,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub cooldown_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: GROQ_API_BASE_URL.to_string(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            cooldown_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub ambient_secs: f32,
    pub timeout_secs: f32,
    pub phrase_time_limit_secs: Option<f32>,
    pub pause_secs: f32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        let defaults = ListenSettings::default();
        Self {
            ambient_secs: defaults.ambient_duration.as_secs_f32(),
            timeout_secs: defaults.timeout.as_secs_f32(),
            phrase_time_limit_secs: None,
            pause_secs: defaults.pause_threshold.as_secs_f32(),
        }
    }
}

impl ListenConfig {
    pub fn settings(&self) -> Result<ListenSettings, ConfigError> {
        Ok(ListenSettings {
            ambient_duration: listen_duration("listen.ambient_secs", self.ambient_secs)?,
            timeout: listen_duration("listen.timeout_secs", self.timeout_secs)?,
            phrase_time_limit: self
                .phrase_time_limit_secs
                .map(|secs| listen_duration("listen.phrase_time_limit_secs", secs))
                .transpose()?,
            pause_threshold: listen_duration("listen.pause_secs", self.pause_secs)?,
            ..ListenSettings::default()
        })
    }
}

fn listen_duration(field: &'static str, secs: f32) -> Result<Duration, ConfigError> {
    if !(0.0..=MAX_LISTEN_SECS).contains(&secs) {
        return Err(ConfigError::Invalid {
            field,
            message: format!(
                "must be between 0 and {} seconds, got {}",
                MAX_LISTEN_SECS, secs
            ),
        });
    }
    Ok(Duration::from_secs_f32(secs))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub base_url: String,
    pub model: String,
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: GROQ_API_BASE_URL.to_string(),
            model: DEFAULT_STT_MODEL.to_string(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub voice_id: String,
    pub model: String,
    pub output_format: String,
    /// Where the synthesized reply is written before playback
    pub output_path: PathBuf,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: ELEVENLABS_API_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model: DEFAULT_TTS_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            output_path: std::env::temp_dir().join("jasoos-reply.mp3"),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            Self::load_from_explicit(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a path that must exist.
    pub fn load_from_explicit(path: PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError { path, source: e })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Invalid { field, message } => {
                write!(f, "Invalid config value for {}: {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("jasoos").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/jasoos/config.toml")
        })
}
