// src/tracking/types.rs — Harmony collector wire types

use serde::{Deserialize, Serialize};

/// Token/call/error delta for one report. Never a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDelta {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub api_calls: u32,
    pub error_count: u32,
}

impl Default for UsageDelta {
    fn default() -> Self {
        Self {
            tokens_input: 0,
            tokens_output: 0,
            api_calls: 1,
            error_count: 0,
        }
    }
}

impl UsageDelta {
    /// One runtime turn's token usage.
    pub fn tokens(tokens_input: u64, tokens_output: u64) -> Self {
        Self {
            tokens_input,
            tokens_output,
            ..Self::default()
        }
    }
}

/// POST /api/sessions/start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub worker_id: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    pub model_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionResponse {
    pub session: SessionInfo,
}

/// Session record returned by the collector. Only `id` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// POST /api/sessions/{id}/heartbeat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRequest {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub api_calls_count: u32,
    pub cost_incurred: f64,
    pub error_count: u32,
}

/// POST /api/sessions/{id}/end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndSessionRequest {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_incurred: f64,
    pub error_count: u32,
}
