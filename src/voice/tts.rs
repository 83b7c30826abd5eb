//! Text-to-speech through ElevenLabs.

use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::playback::play_audio;
use super::VoiceError;
use crate::cooldown::Cooldown;

/// Environment variable holding the ElevenLabs API key.
pub const ELEVENLABS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

pub const ELEVENLABS_API_BASE_URL: &str = "https://api.elevenlabs.io";

pub const DEFAULT_VOICE_ID: &str = "ZF6FPAbjXT4488VcRRnw";

pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_22050_32";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Synthesizes replies to MP3 and plays them.
#[derive(Debug)]
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model: String,
    output_format: String,
    cooldown: Cooldown,
}

impl TextToSpeech {
    /// # Errors
    ///
    /// Returns `VoiceError::MissingApiKey` if the key is empty.
    pub fn new(
        api_key: String,
        base_url: &str,
        voice_id: &str,
        model: &str,
    ) -> Result<Self, VoiceError> {
        if api_key.trim().is_empty() {
            return Err(VoiceError::MissingApiKey(ELEVENLABS_API_KEY_ENV.to_string()));
        }

        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            voice_id: voice_id.to_string(),
            model: model.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            cooldown: Cooldown::new(Duration::from_secs(1)),
        })
    }

    pub fn from_env(base_url: &str, voice_id: &str, model: &str) -> Result<Self, VoiceError> {
        let api_key = std::env::var(ELEVENLABS_API_KEY_ENV)
            .map_err(|_| VoiceError::MissingApiKey(ELEVENLABS_API_KEY_ENV.to_string()))?;
        Self::new(api_key, base_url, voice_id, model)
    }

    pub fn with_output_format(mut self, format: &str) -> Self {
        self.output_format = format.to_string();
        self
    }

    pub fn with_cooldown(mut self, interval: Duration) -> Self {
        self.cooldown = Cooldown::new(interval);
        self
    }

    /// Synthesize `text` into `output` (MP3) and return the byte count.
    ///
    /// # Errors
    ///
    /// `VoiceError::Tts` for non-2xx responses, `VoiceError::HttpError` or
    /// `VoiceError::IoError` otherwise.
    pub async fn synthesize_to_file(&self, text: &str, output: &Path) -> Result<u64, VoiceError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let response = self
            .client
            .post(&url)
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .json(&SpeechRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("API error {}: {}", status, body)));
        }

        let mut file = tokio::fs::File::create(output).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Speak `text` unless it is empty or the previous reply was under a
    /// second ago. Playback runs in the background.
    ///
    /// Returns whether anything was synthesized.
    pub async fn speak(&self, text: &str, output: &Path) -> Result<bool, VoiceError> {
        self.speak_at(text, output, Instant::now()).await
    }

    pub async fn speak_at(
        &self,
        text: &str,
        output: &Path,
        now: Instant,
    ) -> Result<bool, VoiceError> {
        if text.trim().is_empty() || !self.cooldown.try_acquire(now) {
            return Ok(false);
        }

        let started = Instant::now();
        self.synthesize_to_file(text, output).await?;
        play_audio(output.to_path_buf());
        log::info!(
            "text_to_speech took {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(true)
    }
}
