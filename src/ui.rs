//! Browser UI: live webcam preview and the chat transcript.
//!
//! The page polls `/api/camera/frame` on a fixed interval; every device call
//! behind those routes runs on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::camera::{encode_jpeg, CameraBackend, CameraManager, Frame, NativeCameraBackend};
use crate::session::{ChatEntry, ChatHistory};

/// Shared state behind every route.
pub struct UiState<B: CameraBackend = NativeCameraBackend> {
    pub camera: Arc<CameraManager<B>>,
    pub history: ChatHistory,
    pub frame_interval: Duration,
}

/// Build the UI router.
pub fn router<B: CameraBackend + 'static>(state: Arc<UiState<B>>) -> Router {
    Router::new()
        .route("/", get(index::<B>))
        .route("/api/camera/start", post(start_camera::<B>))
        .route("/api/camera/stop", post(stop_camera::<B>))
        .route("/api/camera/frame", get(camera_frame::<B>))
        .route("/api/chat", get(chat::<B>))
        .route("/api/chat/clear", post(clear_chat::<B>))
        .with_state(state)
}

/// Bind `addr` and serve the UI until the task is dropped.
///
/// # Errors
///
/// Returns `UiError::Bind` if the address is taken, `UiError::Serve` if the
/// server stops with an error.
pub async fn serve<B: CameraBackend + 'static>(
    addr: SocketAddr,
    state: Arc<UiState<B>>,
) -> Result<(), UiError> {
    let listener = TcpListener::bind(addr).await.map_err(UiError::Bind)?;
    log::info!("UI listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(UiError::Serve)
}

#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("failed to bind UI server: {0}")]
    Bind(std::io::Error),

    #[error("UI server error: {0}")]
    Serve(std::io::Error),
}

async fn index<B: CameraBackend + 'static>(State(state): State<Arc<UiState<B>>>) -> Html<String> {
    let interval_ms = state.frame_interval.as_millis().to_string();
    Html(INDEX_HTML.replace("{{FRAME_INTERVAL_MS}}", &interval_ms))
}

async fn start_camera<B: CameraBackend + 'static>(
    State(state): State<Arc<UiState<B>>>,
) -> Response {
    let camera = Arc::clone(&state.camera);
    match tokio::task::spawn_blocking(move || camera.start()).await {
        Ok(frame) => jpeg_response(&frame, state.camera.settings().jpeg_quality),
        Err(e) => internal_error(format!("camera task failed: {}", e)),
    }
}

async fn stop_camera<B: CameraBackend + 'static>(
    State(state): State<Arc<UiState<B>>>,
) -> Response {
    let camera = Arc::clone(&state.camera);
    match tokio::task::spawn_blocking(move || camera.stop()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(format!("camera task failed: {}", e)),
    }
}

async fn camera_frame<B: CameraBackend + 'static>(
    State(state): State<Arc<UiState<B>>>,
) -> Response {
    let camera = Arc::clone(&state.camera);
    match tokio::task::spawn_blocking(move || camera.get_frame()).await {
        Ok(Some(frame)) => jpeg_response(&frame, state.camera.settings().jpeg_quality),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(format!("camera task failed: {}", e)),
    }
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    messages: Vec<ChatEntry>,
}

async fn chat<B: CameraBackend + 'static>(
    State(state): State<Arc<UiState<B>>>,
) -> Json<ChatResponse> {
    Json(ChatResponse {
        messages: state.history.snapshot(),
    })
}

async fn clear_chat<B: CameraBackend + 'static>(
    State(state): State<Arc<UiState<B>>>,
) -> StatusCode {
    state.history.clear();
    StatusCode::NO_CONTENT
}

fn jpeg_response(frame: &Frame, quality: u8) -> Response {
    match encode_jpeg(frame, quality) {
        Ok(jpeg) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            jpeg,
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

fn internal_error(message: String) -> Response {
    log::error!("UI request failed: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Jagga Jasoos</title>
<style>
  body { font-family: sans-serif; margin: 2rem; background: #111; color: #eee; }
  main { display: flex; gap: 2rem; }
  #feed { width: 320px; height: 240px; background: #000; border: 1px solid #444; }
  #chat { flex: 1; max-width: 40rem; }
  #messages { height: 24rem; overflow-y: auto; border: 1px solid #444; padding: 0.5rem; }
  .user { color: #9cf; }
  .assistant { color: #fc9; }
  button { margin-top: 0.5rem; margin-right: 0.5rem; }
</style>
</head>
<body>
<h1>Jagga Jasoos</h1>
<main>
  <section>
    <img id="feed" alt="Webcam feed">
    <div>
      <button id="start">Start</button>
      <button id="stop">Stop</button>
    </div>
  </section>
  <section id="chat">
    <div id="messages"></div>
    <button id="clear">Clear</button>
  </section>
</main>
<script>
const feed = document.getElementById("feed");
const messages = document.getElementById("messages");
let lastUrl = null;

async function showJpeg(response) {
  if (response.status !== 200) return;
  const blob = await response.blob();
  const url = URL.createObjectURL(blob);
  feed.src = url;
  if (lastUrl) URL.revokeObjectURL(lastUrl);
  lastUrl = url;
}

async function refreshFrame() {
  try { await showJpeg(await fetch("/api/camera/frame", { cache: "no-store" })); } catch (_) {}
}

async function refreshChat() {
  try {
    const body = await (await fetch("/api/chat")).json();
    messages.innerHTML = "";
    for (const m of body.messages) {
      const p = document.createElement("p");
      p.className = m.role;
      p.textContent = (m.role === "user" ? "You: " : "Dora: ") + m.content;
      messages.appendChild(p);
    }
    messages.scrollTop = messages.scrollHeight;
  } catch (_) {}
}

document.getElementById("start").onclick = async () => {
  await showJpeg(await fetch("/api/camera/start", { method: "POST" }));
};
document.getElementById("stop").onclick = () => fetch("/api/camera/stop", { method: "POST" });
document.getElementById("clear").onclick = async () => {
  await fetch("/api/chat/clear", { method: "POST" });
  refreshChat();
};

setInterval(refreshFrame, {{FRAME_INTERVAL_MS}});
setInterval(refreshChat, 1000);
refreshChat();
</script>
</body>
</html>
"#;
