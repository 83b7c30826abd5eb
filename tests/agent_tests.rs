//! Mock HTTP tests for the chat client, the image analysis tool and the agent loop.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_settings, FakeBackend};
use jasoos::agent::{Agent, Tool, MAX_TOOL_ROUNDS};
use jasoos::camera::{Backend, DeviceIdentity, SnapshotCapture};
use jasoos::llm::{ChatClient, ChatMessage, LlmError, RetryPolicy};
use jasoos::vision::{ImageAnalysisTool, VisionClient, TOOL_NAME, WAIT_MESSAGE};

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": text}}]
    }))
}

fn tool_call_reply(name: &str, arguments: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            }]
        }}]
    }))
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

fn client(server: &MockServer) -> ChatClient {
    ChatClient::new("test-key".to_string(), &server.uri(), "test-model")
        .unwrap()
        .with_retry_policy(fast_retries())
}

fn analysis_tool(backend: FakeBackend, vision: &MockServer) -> ImageAnalysisTool<FakeBackend> {
    ImageAnalysisTool::new(
        Arc::new(SnapshotCapture::new(backend, test_settings())),
        VisionClient::new(client(vision)),
    )
}

fn webcam() -> DeviceIdentity {
    DeviceIdentity {
        index: 0,
        backend: Backend::MediaFoundation,
    }
}

// === Chat Client Tests ===

#[tokio::test]
async fn test_complete_sends_bearer_and_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_string_contains("\"model\":\"test-model\""))
        .respond_with(text_reply("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server)
        .complete(&[ChatMessage::user("hi")], &[])
        .await
        .unwrap();
    assert_eq!(reply.assistant_text(), Some("hello"));
}

#[tokio::test]
async fn test_complete_retries_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(text_reply("finally"))
        .mount(&server)
        .await;

    let reply = client(&server)
        .complete(&[ChatMessage::user("hi")], &[])
        .await
        .unwrap();
    assert_eq!(reply.assistant_text(), Some("finally"));
}

#[tokio::test]
async fn test_complete_gives_up_after_max_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("nope"))
        .expect(4)
        .mount(&server)
        .await;

    let result = client(&server)
        .complete(&[ChatMessage::user("hi")], &[])
        .await;
    assert!(matches!(result, Err(LlmError::RateLimit { .. })));
}

#[tokio::test]
async fn test_complete_does_not_retry_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .complete(&[ChatMessage::user("hi")], &[])
        .await;
    assert!(matches!(result, Err(LlmError::ApiError { status: 500, .. })));
}

#[tokio::test]
async fn test_complete_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let result = client(&server)
        .complete(&[ChatMessage::user("hi")], &[])
        .await;
    assert!(matches!(result, Err(LlmError::EmptyResponse)));
}

// === Image Analysis Tool Tests ===

#[tokio::test]
async fn test_analysis_sends_jpeg_to_vision_model() {
    let vision = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .and(body_string_contains("what am I holding?"))
        .respond_with(text_reply("A coffee mug"))
        .expect(1)
        .mount(&vision)
        .await;

    let tool = analysis_tool(FakeBackend::with_device(webcam()), &vision);
    assert_eq!(tool.capture_and_analyze("what am I holding?").await, "A coffee mug");
}

#[tokio::test]
async fn test_analysis_within_cooldown_asks_to_wait() {
    let vision = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_reply("A cat"))
        .expect(1)
        .mount(&vision)
        .await;

    let backend = FakeBackend::with_device(webcam());
    let tool = analysis_tool(backend.clone(), &vision);
    let now = Instant::now();

    assert_eq!(tool.capture_and_analyze_at("what is this?", now).await, "A cat");
    let opens = backend.hardware.open_log().len();
    assert_eq!(
        tool.capture_and_analyze_at("and now?", now + Duration::from_millis(500))
            .await,
        WAIT_MESSAGE
    );
    // Rejected calls never touch the camera
    assert_eq!(backend.hardware.open_log().len(), opens);
}

#[tokio::test]
async fn test_analysis_after_cooldown_runs_again() {
    let vision = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_reply("Still a cat"))
        .expect(2)
        .mount(&vision)
        .await;

    let tool = analysis_tool(FakeBackend::with_device(webcam()), &vision);
    let now = Instant::now();

    tool.capture_and_analyze_at("first", now).await;
    let answer = tool
        .capture_and_analyze_at("second", now + Duration::from_millis(1100))
        .await;
    assert_eq!(answer, "Still a cat");
}

#[tokio::test]
async fn test_analysis_empty_query() {
    let vision = MockServer::start().await;
    let backend = FakeBackend::with_device(webcam());
    let tool = analysis_tool(backend.clone(), &vision);

    assert_eq!(tool.capture_and_analyze("  ").await, "Error: Query is required");
    assert!(backend.hardware.open_log().is_empty());
}

#[tokio::test]
async fn test_analysis_without_camera() {
    let vision = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_reply("unused"))
        .expect(0)
        .mount(&vision)
        .await;

    let tool = analysis_tool(FakeBackend::new(), &vision);
    assert_eq!(
        tool.capture_and_analyze("what do you see?").await,
        "Error: Failed to capture image"
    );
}

#[tokio::test]
async fn test_analysis_vision_failure_is_reported_as_text() {
    let vision = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model down"))
        .mount(&vision)
        .await;

    let tool = analysis_tool(FakeBackend::with_device(webcam()), &vision);
    let answer = tool.capture_and_analyze("what do you see?").await;
    assert!(answer.starts_with("Error: "), "got {answer}");
    assert!(answer.contains("model down"));
}

#[tokio::test]
async fn test_tool_definition_requires_query() {
    let vision = MockServer::start().await;
    let tool = analysis_tool(FakeBackend::new(), &vision);
    let definition = serde_json::to_value(tool.definition()).unwrap();

    assert_eq!(definition["type"], "function");
    assert_eq!(definition["function"]["name"], TOOL_NAME);
    assert_eq!(definition["function"]["parameters"]["required"], json!(["query"]));
}

// === Agent Tests ===

/// Tool that counts its calls and echoes its arguments.
#[derive(Default)]
struct EchoTool {
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn call(&self, arguments: Value) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("echo: {}", arguments["text"].as_str().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_agent_answers_without_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("You are Dora"))
        .respond_with(text_reply("Hi, I'm Dora!"))
        .expect(1)
        .mount(&server)
        .await;

    let agent = Agent::new(client(&server));
    assert_eq!(agent.ask("who are you?").await, "Hi, I'm Dora!");
}

#[tokio::test]
async fn test_agent_runs_requested_tool_and_feeds_result_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"role\":\"tool\""))
        .and(body_string_contains("echo: ping"))
        .respond_with(text_reply("The tool said ping"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(tool_call_reply("echo", "{\"text\":\"ping\"}"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let echo = Arc::new(EchoTool::default());
    let agent = Agent::new(client(&server)).with_tool(echo.clone());

    assert_eq!(agent.ask("use the tool").await, "The tool said ping");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_agent_reports_unknown_tool_to_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("unknown tool 'teleport'"))
        .respond_with(text_reply("I can't do that"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(tool_call_reply("teleport", "{}"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let agent = Agent::new(client(&server));
    assert_eq!(agent.ask("beam me up").await, "I can't do that");
}

#[tokio::test]
async fn test_agent_stops_after_max_tool_rounds() {
    let server = MockServer::start().await;
    // The final request is sent without tool definitions
    Mock::given(method("POST"))
        .and(body_string_contains("\"tools\""))
        .respond_with(tool_call_reply("echo", "{\"text\":\"again\"}"))
        .expect(MAX_TOOL_ROUNDS as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(text_reply("Done looping"))
        .expect(1)
        .mount(&server)
        .await;

    let echo = Arc::new(EchoTool::default());
    let agent = Agent::new(client(&server)).with_tool(echo.clone());

    assert_eq!(agent.ask("loop forever").await, "Done looping");
    assert_eq!(echo.calls.load(Ordering::SeqCst), MAX_TOOL_ROUNDS);
}

#[tokio::test]
async fn test_agent_failure_becomes_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let agent = Agent::new(client(&server));
    let answer = agent.ask("hello").await;
    assert!(answer.starts_with("Oops, something went wrong: "), "got {answer}");
}

#[tokio::test]
async fn test_agent_with_image_tool_end_to_end() {
    let llm = MockServer::start().await;
    let vision = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .respond_with(text_reply("A person waving"))
        .expect(1)
        .mount(&vision)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("A person waving"))
        .respond_with(text_reply("You're waving at me!"))
        .with_priority(1)
        .mount(&llm)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains(TOOL_NAME))
        .respond_with(tool_call_reply(TOOL_NAME, "{\"query\":\"what is the user doing?\"}"))
        .up_to_n_times(1)
        .mount(&llm)
        .await;

    let backend = FakeBackend::with_device(webcam());
    let agent =
        Agent::new(client(&llm)).with_tool(Arc::new(analysis_tool(backend.clone(), &vision)));

    assert_eq!(agent.tool_names(), vec![TOOL_NAME]);
    assert_eq!(agent.ask("what am I doing?").await, "You're waving at me!");
    assert_eq!(backend.hardware.open_handles(), 0);
}
