// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted mock [`ChatProvider`] for deterministic orchestrator tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use taskpilot_core::{
    AgentError, ChatProvider, ChatRequest, ChatResponse, RequestedToolCall,
};

/// One scripted turn: either a canned reply or a canned failure.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Plain assistant text.
    Text(String),
    /// A set of (name, json-arguments) tool calls, optionally with text.
    ToolCalls(Option<String>, Vec<(String, String)>),
    /// Fail the call with a provider error carrying this message.
    Fail(String),
}

/// Mock provider that pops scripted replies in order.
///
/// Exhausting the script is a test bug and fails the call loudly. The call
/// counter lets tests assert how many attempts the orchestrator made.
pub struct MockChatProvider {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ChatRequest>>,
}

impl MockChatProvider {
    pub fn new(script: Vec<ScriptedReply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    /// Shorthand for a single text reply.
    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![ScriptedReply::Text(text.to_string())])
    }

    /// Number of `chat` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, for asserting on assembled messages.
    pub async fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().await.clone()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().await = Some(request);

        let reply = self.script.lock().await.pop_front().ok_or_else(|| {
            AgentError::Internal("mock provider script exhausted".to_string())
        })?;

        match reply {
            ScriptedReply::Text(text) => Ok(ChatResponse {
                content: Some(text),
                tool_calls: vec![],
            }),
            ScriptedReply::ToolCalls(content, calls) => Ok(ChatResponse {
                content,
                tool_calls: calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, arguments))| RequestedToolCall {
                        id: format!("call_{i}"),
                        name,
                        arguments,
                    })
                    .collect(),
            }),
            ScriptedReply::Fail(message) => Err(AgentError::Provider {
                message,
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_core::ChatMessage;

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hello")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn pops_replies_in_order() {
        let provider = MockChatProvider::new(vec![
            ScriptedReply::Text("first".into()),
            ScriptedReply::Fail("rate limit exceeded (429)".into()),
            ScriptedReply::Text("second".into()),
        ]);

        let r1 = provider.chat(request()).await.unwrap();
        assert_eq!(r1.content.as_deref(), Some("first"));

        assert!(provider.chat(request()).await.is_err());

        let r3 = provider.chat(request()).await.unwrap();
        assert_eq!(r3.content.as_deref(), Some("second"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn tool_call_replies_get_sequential_ids() {
        let provider = MockChatProvider::new(vec![ScriptedReply::ToolCalls(
            None,
            vec![
                ("add_task".into(), r#"{"title":"a"}"#.into()),
                ("list_tasks".into(), "{}".into()),
            ],
        )]);

        let response = provider.chat(request()).await.unwrap();
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "call_0");
        assert_eq!(response.tool_calls[1].id, "call_1");
    }

    #[tokio::test]
    async fn exhausted_script_fails_loudly() {
        let provider = MockChatProvider::new(vec![]);
        let err = provider.chat(request()).await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn records_last_request() {
        let provider = MockChatProvider::replying("ok");
        provider.chat(request()).await.unwrap();
        let last = provider.last_request().await.unwrap();
        assert_eq!(last.messages[0].content, "hello");
    }
}
