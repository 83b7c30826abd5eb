//! Tool-using conversational agent.
//!
//! Sends the user's query with the persona prompt and tool definitions,
//! runs any tool calls the model requests, and feeds the results back until
//! the model answers in plain text.

mod tool;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::llm::{ChatClient, ChatMessage, LlmError, ToolCall, ToolDefinition};

pub use tool::Tool;

/// Tool-call rounds allowed before the model must answer without tools.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Persona prompt for the assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Dora, a witty, clever, and helpful assistant.
Here's how you operate:
    - FIRST and FOREMOST, figure out from the query whether it needs a look through the webcam. If yes, call the analyze_image_with_query tool and proceed.
    - Don't ask for permission to look through the webcam, and don't announce that you are about to take a peek. Call the tool straight away.
    - When the user asks something that can only be answered by taking a photo, call the analyze_image_with_query tool.
    - Always present tool results in a natural, witty, human-sounding way, as if Dora herself is speaking.
Make every interaction feel smart, snappy, and personable.";

pub struct Agent {
    client: ChatClient,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl Agent {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Answer a query. Failures come back as a spoken apology, not an error.
    pub async fn ask(&self, query: &str) -> String {
        let started = Instant::now();
        let answer = match self.run(query).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Error in ask_agent: {}", e);
                format!("Oops, something went wrong: {}", e)
            }
        };
        log::info!("ask_agent took {:.2} seconds", started.elapsed().as_secs_f64());
        answer
    }

    /// Run the tool loop and return the model's final text.
    pub async fn run(&self, query: &str) -> Result<String, LlmError> {
        let definitions: Vec<ToolDefinition> = self.tools.iter().map(|t| t.definition()).collect();
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(query),
        ];

        for _ in 0..MAX_TOOL_ROUNDS {
            let reply = self.client.complete(&messages, &definitions).await?;
            let calls = match &reply {
                ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    tool_calls.clone()
                }
                _ => return Ok(reply.assistant_text().unwrap_or_default().to_string()),
            };

            messages.push(reply);
            for call in calls {
                let result = self.dispatch(&call).await;
                messages.push(ChatMessage::tool_result(call.id, result));
            }
        }

        log::warn!("Tool round limit reached; asking for a final answer");
        let reply = self.client.complete(&messages, &[]).await?;
        Ok(reply.assistant_text().unwrap_or_default().to_string())
    }

    async fn dispatch(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.function.name) else {
            log::warn!("Model requested unknown tool '{}'", call.function.name);
            return format!("Error: unknown tool '{}'", call.function.name);
        };

        let arguments = match parse_arguments(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(e) => return format!("Error: {}", e),
        };

        log::info!("Calling {} for the model", tool.name());
        tool.call(arguments).await
    }
}

fn parse_arguments(raw: &str) -> Result<Value, LlmError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| LlmError::InvalidToolArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments_empty_is_object() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
    }

    #[test]
    fn test_parse_arguments_valid() {
        assert_eq!(
            parse_arguments(r#"{"query":"what am I holding?"}"#).unwrap(),
            json!({"query": "what am I holding?"})
        );
    }

    #[test]
    fn test_parse_arguments_invalid() {
        assert!(matches!(
            parse_arguments("{not json"),
            Err(LlmError::InvalidToolArguments(_))
        ));
    }
}
