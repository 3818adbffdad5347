// src/runtime/mod.rs — Agent runtime boundary
//
// The runtime owns conversation state and produces a lazy stream of events per
// user message. Everything downstream only sees `StreamEvent`s.

pub mod gemini;
pub mod store;
pub mod tools;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

pub use gemini::GeminiRuntime;

/// Faults raised by an agent runtime while producing events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Model provider error: {message}")]
    Provider { message: String, retriable: bool },

    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    #[error("Conversation '{id}' not found")]
    SessionNotFound { id: String },

    #[error("Tool loop: gave up after {rounds} tool rounds")]
    ToolLoop { rounds: u32 },
}

impl RuntimeError {
    pub fn provider(message: impl Into<String>, retriable: bool) -> Self {
        RuntimeError::Provider {
            message: message.into(),
            retriable,
        }
    }
}

/// Token usage for one runtime turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One event from the runtime: usage, content, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    /// Originating agent; `None` means the root agent.
    pub author: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Text fragments in emission order.
    pub texts: Vec<String>,
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            ..Self::default()
        }
    }

    pub fn usage(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            usage: Some(TokenUsage {
                input_tokens,
                output_tokens,
            }),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
        });
        self
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RuntimeError>> + Send>>;

/// An agent runtime: conversation contexts plus a per-message event stream.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Name of the root agent; default author of unattributed content.
    fn root_agent(&self) -> &str;

    /// Open a conversation context for `user_id`, returning its id.
    async fn create_session(&self, user_id: &str) -> Result<String, RuntimeError>;

    /// Run one user message. The stream is not restartable.
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<EventStream, RuntimeError>;

    /// Drop the conversation context.
    async fn close_session(&self, session_id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builders() {
        let e = StreamEvent::text("hi").with_author("shopping_agent").with_usage(3, 4);
        assert_eq!(e.texts, vec!["hi".to_string()]);
        assert_eq!(e.author.as_deref(), Some("shopping_agent"));
        assert_eq!(
            e.usage,
            Some(TokenUsage {
                input_tokens: 3,
                output_tokens: 4
            })
        );

        let u = StreamEvent::usage(1, 2);
        assert!(u.texts.is_empty());
        assert!(u.author.is_none());
    }

    #[test]
    fn test_runtime_error_display() {
        let e = RuntimeError::ToolLoop { rounds: 8 };
        assert_eq!(e.to_string(), "Tool loop: gave up after 8 tool rounds");
        let e = RuntimeError::provider("HTTP 503", true);
        assert_eq!(e.to_string(), "Model provider error: HTTP 503");
    }
}
