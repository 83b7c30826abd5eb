//! Tools the agent can call.

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDefinition;

/// A callable capability advertised to the model.
///
/// Tools report failures in their returned text so the model can narrate
/// them; they never fail the conversation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters(&self) -> Value;

    async fn call(&self, arguments: Value) -> String;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}
