//! OpenAI-compatible chat completion client shared by the agent and the
//! vision tool.

mod client;
mod retry;
mod types;

pub use client::{ChatClient, LlmError};
pub use retry::{calculate_backoff, RetryPolicy};
pub use types::{
    ChatMessage, ContentPart, FunctionCall, FunctionDefinition, ImageUrl, MessageContent,
    ToolCall, ToolDefinition,
};
