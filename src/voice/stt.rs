//! Speech-to-text through Groq's Whisper endpoint.

use std::time::Duration;

use super::VoiceError;

/// Environment variable holding the Groq API key.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// OpenAI-compatible Groq base URL.
pub const GROQ_API_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes recorded speech.
#[derive(Debug, Clone)]
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

impl SpeechToText {
    /// # Errors
    ///
    /// Returns `VoiceError::MissingApiKey` if the key is empty.
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        language: &str,
    ) -> Result<Self, VoiceError> {
        if api_key.trim().is_empty() {
            return Err(VoiceError::MissingApiKey(GROQ_API_KEY_ENV.to_string()));
        }

        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            language: language.to_string(),
        })
    }

    pub fn from_env(base_url: &str, model: &str, language: &str) -> Result<Self, VoiceError> {
        let api_key = std::env::var(GROQ_API_KEY_ENV)
            .map_err(|_| VoiceError::MissingApiKey(GROQ_API_KEY_ENV.to_string()))?;
        Self::new(api_key, base_url, model, language)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Transcribe WAV audio to text.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::Stt` for non-2xx responses, or
    /// `VoiceError::HttpError` if the request fails.
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String, VoiceError> {
        log::debug!("Starting transcription of {} bytes", wav.len());

        let part = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("audio_question.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("API error {}: {}", status, body)));
        }

        let result: TranscriptionResponse = response.json().await?;
        log::info!("Transcribed: {}", result.text);
        Ok(result.text)
    }
}
