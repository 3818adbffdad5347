// src/api/types.rs

use serde::{Deserialize, Serialize};

use crate::core::ContentFragment;

/// Request body for a one-shot task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response for a one-shot task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResponse {
    pub task_id: String,
    /// All forwarded text fragments joined with newlines.
    pub response: String,
    pub errors: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent: String,
}

/// Frames sent to a duplex (WebSocket) caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Text { content: String, agent: String },
    Error { content: String },
}

impl From<ContentFragment> for ServerMessage {
    fn from(f: ContentFragment) -> Self {
        ServerMessage::Text {
            content: f.content,
            agent: f.agent,
        }
    }
}
