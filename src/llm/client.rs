//! HTTP client for the remote language-model service.

use reqwest::Client;
use secrecy::ExposeSecret;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::types::{
    ChatMessage, MessagesRequest, MessagesResponse, ToolDefinition, ToolServer,
};

const API_VERSION: &str = "2023-06-01";

/// Client for the block-structured messages endpoint.
pub struct ModelClient {
    client: Client,
    config: LlmConfig,
}

impl ModelClient {
    /// Create a client. Fails when no credential is configured: driving a
    /// tool loop without one is unrecoverable.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::MissingCredential);
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self { client, config })
    }

    /// Which model this client targets.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_key(&self) -> String {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default()
    }

    /// One messages call: system prompt, full history, declared tools,
    /// and any external tool servers passed through opaquely.
    pub async fn complete(
        &self,
        system: Option<String>,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        tool_servers: Vec<ToolServer>,
    ) -> Result<MessagesResponse, LlmError> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            mcp_servers: if tool_servers.is_empty() {
                None
            } else {
                Some(tool_servers)
            },
        };

        let url = format!("{}/v1/messages", self.config.base_url);
        tracing::debug!(model = %self.config.model, "sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("model request failed: {}", e);
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed);
            }
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::RequestFailed {
                reason: format!("HTTP {}: {}", status, body),
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::InvalidResponse {
                reason: format!("JSON parse error: {}", e),
            })?;

        tracing::debug!(
            stop_reason = ?parsed.stop_reason,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "messages response received"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_credential() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            ModelClient::new(config),
            Err(LlmError::MissingCredential)
        ));
    }

    #[test]
    fn test_client_with_credential() {
        let config = LlmConfig {
            api_key: Some(secrecy::SecretString::from("test-key".to_string())),
            ..Default::default()
        };
        let client = ModelClient::new(config).unwrap();
        assert!(!client.model().is_empty());
    }
}
