//! Remote language-model boundary: wire types and the HTTP client.

mod client;
mod types;

pub use client::ModelClient;
pub use types::{
    ChatMessage, ContentBlock, MessagesRequest, MessagesResponse, Role, StopReason,
    ToolDefinition, ToolServer, Usage,
};

use async_trait::async_trait;

use crate::error::LlmError;

/// The model collaborator boundary.
///
/// One method: system prompt, full history, declared tools, and an
/// opaque external tool-server list in; content blocks and a stop
/// reason out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        system: Option<String>,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        tool_servers: Vec<ToolServer>,
    ) -> Result<MessagesResponse, LlmError>;
}

#[async_trait]
impl LlmProvider for ModelClient {
    async fn complete(
        &self,
        system: Option<String>,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        tool_servers: Vec<ToolServer>,
    ) -> Result<MessagesResponse, LlmError> {
        ModelClient::complete(self, system, messages, tools, tool_servers).await
    }
}
