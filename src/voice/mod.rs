//! Microphone capture, speech-to-text, text-to-speech and playback.

mod playback;
mod recorder;
mod stt;
mod tts;

pub use playback::{play_audio, player_command};
pub use recorder::{
    samples_to_wav, DetectorEvent, ListenSettings, SpeechDetector, SpeechRecorder,
};
pub use stt::{SpeechToText, DEFAULT_STT_MODEL, GROQ_API_BASE_URL, GROQ_API_KEY_ENV};
pub use tts::{
    TextToSpeech, DEFAULT_OUTPUT_FORMAT, DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID,
    ELEVENLABS_API_BASE_URL, ELEVENLABS_API_KEY_ENV,
};

/// Errors from the voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("API key not configured (set {0})")]
    MissingApiKey(String),

    #[error("Audio device error: {0}")]
    Audio(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Speech-to-text error: {0}")]
    Stt(String),

    #[error("Text-to-speech error: {0}")]
    Tts(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
