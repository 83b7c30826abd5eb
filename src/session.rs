//! The listen → think → speak loop and the chat transcript it produces.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::agent::Agent;
use crate::voice::{SpeechRecorder, SpeechToText, TextToSpeech};

/// Saying this ends the conversation loop.
pub const EXIT_PHRASE: &str = "goodbye";

/// Pause between turns.
const TURN_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
}

/// Transcript shown in the UI. Lives in memory only.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    entries: Arc<Mutex<Vec<ChatEntry>>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one user/assistant exchange.
    pub fn push_exchange(&self, user: &str, assistant: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(ChatEntry {
            role: Role::User,
            content: user.to_string(),
        });
        entries.push(ChatEntry {
            role: Role::Assistant,
            content: assistant.to_string(),
        });
    }

    pub fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a transcript asks to end the session.
pub fn is_exit_request(transcript: &str) -> bool {
    transcript.to_lowercase().contains(EXIT_PHRASE)
}

/// Everything the voice loop needs.
pub struct Conversation {
    pub recorder: SpeechRecorder,
    pub stt: SpeechToText,
    pub agent: Agent,
    pub tts: Option<TextToSpeech>,
    pub speech_output: PathBuf,
    pub history: ChatHistory,
}

impl Conversation {
    /// Handle one transcript: ask the agent, speak the reply, record the exchange.
    ///
    /// Returns the reply, or `None` when the transcript is blank.
    pub async fn respond(&self, transcript: &str) -> Option<String> {
        if transcript.trim().is_empty() {
            return None;
        }

        let reply = self.agent.ask(transcript).await;
        if let Some(tts) = &self.tts {
            if let Err(e) = tts.speak(&reply, &self.speech_output).await {
                log::error!("Error in text to speech: {}", e);
            }
        }
        self.history.push_exchange(transcript, &reply);
        Some(reply)
    }

    /// Listen and answer until the user says goodbye or the microphone fails.
    pub async fn run(self) {
        loop {
            let started = Instant::now();

            let recorder = self.recorder.clone();
            let recorded = match tokio::task::spawn_blocking(move || recorder.record()).await {
                Ok(Ok(recorded)) => recorded,
                Ok(Err(e)) => {
                    log::error!("Error in continuous recording: {}", e);
                    break;
                }
                Err(e) => {
                    log::error!("Recording task failed: {}", e);
                    break;
                }
            };

            let transcript = match recorded {
                Some(wav) => match self.stt.transcribe(&wav).await {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Error in transcription: {}", e);
                        String::new()
                    }
                },
                None => String::new(),
            };

            if is_exit_request(&transcript) {
                log::info!("Goodbye heard, ending conversation");
                break;
            }

            self.respond(&transcript).await;
            log::info!(
                "Audio loop took {:.2} seconds",
                started.elapsed().as_secs_f64()
            );
            tokio::time::sleep(TURN_PAUSE).await;
        }
    }
}
