// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gemini chat-completion provider for Taskpilot.
//!
//! Talks to the Gemini OpenAI-compatible endpoint and adapts the wire
//! format to the [`ChatProvider`] trait the orchestrator consumes.

pub mod client;
pub mod types;

use async_trait::async_trait;

use taskpilot_config::GeminiConfig;
use taskpilot_core::{
    AgentError, ChatProvider, ChatRequest, ChatResponse, HealthStatus, RequestedToolCall,
};

use crate::client::GeminiClient;
use crate::types::{ApiMessage, ChatCompletionRequest};

/// Resolve the API key: config value first, then `GEMINI_API_KEY`.
pub fn resolve_api_key(config: &GeminiConfig) -> Result<String, AgentError> {
    if let Some(key) = &config.api_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(AgentError::Config(
            "no Gemini API key: set gemini.api_key or GEMINI_API_KEY".to_string(),
        )),
    }
}

/// [`ChatProvider`] backed by [`GeminiClient`].
pub struct GeminiProvider {
    client: GeminiClient,
}

impl GeminiProvider {
    /// Build a provider from configuration, resolving the API key.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, AgentError> {
        let api_key = resolve_api_key(config)?;
        let client = GeminiClient::new(
            &api_key,
            &config.base_url,
            &config.model,
            std::time::Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self { client })
    }

    /// Build a provider around an existing client (tests, custom base URL).
    pub fn with_client(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AgentError> {
        let has_tools = !request.tools.is_empty();
        let api_request = ChatCompletionRequest {
            model: self.client.model().to_string(),
            messages: request
                .messages
                .into_iter()
                .map(|m| ApiMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            tools: has_tools.then_some(request.tools),
            tool_choice: has_tools.then(|| "auto".to_string()),
        };

        let api_response = self.client.chat_completions(&api_request).await?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider {
                message: "API response contained no choices".to_string(),
                source: None,
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| RequestedToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, AgentError> {
        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_core::ChatMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> GeminiProvider {
        let client = GeminiClient::new(
            "test-key",
            server_uri,
            "gemini-2.5-flash",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        GeminiProvider::with_client(client)
    }

    #[test]
    fn resolve_api_key_prefers_config() {
        let config = GeminiConfig {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&config).unwrap(), "from-config");
    }

    #[test]
    fn resolve_api_key_empty_config_value_is_not_a_key() {
        let config = GeminiConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        // Falls through to the environment; may or may not be set there, but
        // the empty config value itself must never be accepted.
        if let Ok(key) = resolve_api_key(&config) {
            assert!(!key.is_empty());
        }
    }

    #[tokio::test]
    async fn chat_maps_tool_calls_into_core_types() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "chatcmpl-tools",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "add_task", "arguments": "{\"title\":\"milk\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                serde_json::json!({"tool_choice": "auto"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let response = provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user("add milk")],
                tools: vec![serde_json::json!({"type": "function"})],
            })
            .await
            .unwrap();

        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "add_task");
        assert_eq!(response.tool_calls[0].arguments, "{\"title\":\"milk\"}");
    }

    #[tokio::test]
    async fn chat_without_tools_omits_tool_choice() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "chatcmpl-text",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }]
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let response = provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user("hi")],
                tools: vec![],
            })
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("Hello!"));
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn empty_choices_is_a_provider_error() {
        let server = MockServer::start().await;
        let body = serde_json::json!({"id": "chatcmpl-empty", "choices": []});
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user("hi")],
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
