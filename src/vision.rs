//! Visual question answering over a fresh webcam snapshot.
//!
//! [`ImageAnalysisTool`] is what the agent calls when a question needs a
//! look through the camera: it takes a snapshot, ships it to a vision model
//! with the question, and returns the answer as plain text.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::agent::Tool;
use crate::camera::{CameraBackend, NativeCameraBackend, SnapshotCapture};
use crate::cooldown::Cooldown;
use crate::llm::{ChatClient, ChatMessage, LlmError};

/// Name the agent sees for the tool.
pub const TOOL_NAME: &str = "analyze_image_with_query";

/// Returned when a call arrives inside the cooldown window.
pub const WAIT_MESSAGE: &str = "Please wait before analyzing again";

/// Minimum spacing between analyses.
pub const ANALYSIS_COOLDOWN: Duration = Duration::from_secs(1);

/// Vision model client.
#[derive(Debug, Clone)]
pub struct VisionClient {
    client: ChatClient,
}

impl VisionClient {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Ask `query` about a JPEG image.
    pub async fn analyze(&self, query: &str, jpeg: &[u8]) -> Result<String, LlmError> {
        let encoded = BASE64.encode(jpeg);
        let messages = [ChatMessage::user_with_jpeg(query, &encoded)];
        let reply = self.client.complete(&messages, &[]).await?;
        reply
            .assistant_text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Snapshot + vision model, rate limited, exposed as an agent tool.
pub struct ImageAnalysisTool<B: CameraBackend + 'static = NativeCameraBackend> {
    snapshot: Arc<SnapshotCapture<B>>,
    vision: VisionClient,
    cooldown: Cooldown,
}

impl<B: CameraBackend + 'static> ImageAnalysisTool<B> {
    pub fn new(snapshot: Arc<SnapshotCapture<B>>, vision: VisionClient) -> Self {
        Self {
            snapshot,
            vision,
            cooldown: Cooldown::new(ANALYSIS_COOLDOWN),
        }
    }

    pub fn with_cooldown(mut self, interval: Duration) -> Self {
        self.cooldown = Cooldown::new(interval);
        self
    }

    /// Capture a frame and answer `query` about it.
    pub async fn capture_and_analyze(&self, query: &str) -> String {
        self.capture_and_analyze_at(query, Instant::now()).await
    }

    /// [`capture_and_analyze`](Self::capture_and_analyze) with the clock supplied.
    ///
    /// Never fails: every problem is reported as text for the agent to narrate.
    pub async fn capture_and_analyze_at(&self, query: &str, now: Instant) -> String {
        if !self.cooldown.try_acquire(now) {
            return WAIT_MESSAGE.to_string();
        }

        if query.trim().is_empty() {
            return "Error: Query is required".to_string();
        }

        let started = Instant::now();
        let snapshot = Arc::clone(&self.snapshot);
        let jpeg = match tokio::task::spawn_blocking(move || snapshot.capture_image()).await {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(e)) => {
                log::error!("Snapshot unavailable: {}", e);
                return "Error: Failed to capture image".to_string();
            }
            Err(e) => {
                log::error!("Snapshot task failed: {}", e);
                return "Error: Failed to capture image".to_string();
            }
        };

        match self.vision.analyze(query, &jpeg).await {
            Ok(answer) => {
                log::info!(
                    "analyze_image_with_query took {:.2} seconds",
                    started.elapsed().as_secs_f64()
                );
                answer
            }
            Err(e) => {
                log::error!("Error in image analysis: {}", e);
                format!("Error: {}", e)
            }
        }
    }
}

#[async_trait]
impl<B: CameraBackend + 'static> Tool for ImageAnalysisTool<B> {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Takes a photo through the user's webcam and answers a question about it. \
         Use it whenever answering requires seeing the user or their surroundings."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for or answer about the webcam image"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, arguments: Value) -> String {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.capture_and_analyze(query).await
    }
}
