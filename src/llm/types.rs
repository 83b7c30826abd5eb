//! Wire types for OpenAI-compatible chat completion endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: MessageContent,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: MessageContent::Text(content.into()),
        }
    }

    /// User turn carrying a question and a JPEG as a data URL.
    pub fn user_with_jpeg(text: impl Into<String>, jpeg_base64: &str) -> Self {
        ChatMessage::User {
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{}", jpeg_base64),
                    },
                },
            ]),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Text of an assistant turn, if it has any.
    pub fn assistant_text(&self) -> Option<&str> {
        match self {
            ChatMessage::Assistant {
                content: Some(text),
                ..
            } if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    pub arguments: String,
}

/// A tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolDefinition],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChatMessage,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

fn function_kind() -> String {
    "function".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_with_jpeg_serializes_as_parts() {
        let msg = ChatMessage::user_with_jpeg("what is this?", "QUJD");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this?"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}}
                ]
            })
        );
    }

    #[test]
    fn test_assistant_with_null_content_and_tool_calls() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "analyze_image_with_query", "arguments": "{\"query\":\"hi\"}"}
            }]
        }))
        .unwrap();

        match msg {
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                assert!(content.is_none());
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].function.name, "analyze_image_with_query");
            }
            other => panic!("Expected assistant message, got {:?}", other),
        }
    }

    #[test]
    fn test_assistant_text_ignores_blank() {
        let blank = ChatMessage::Assistant {
            content: Some("  ".to_string()),
            tool_calls: vec![],
        };
        assert!(blank.assistant_text().is_none());
        let text = ChatMessage::Assistant {
            content: Some("hello".to_string()),
            tool_calls: vec![],
        };
        assert_eq!(text.assistant_text(), Some("hello"));
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: None,
            tools: &[],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("temperature").is_none());
    }
}
