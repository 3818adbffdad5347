// src/infra/errors.rs — Error types for harmony-agent

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum HarmonyError {
    // Telemetry errors (never surfaced to the caller of a task)
    #[error("Tracking unavailable: {message}")]
    TrackingUnavailable { message: String },

    #[error("Tracking report to '{endpoint}' failed: {message}")]
    TrackingReportFailed { endpoint: String, message: String },

    // Agent runtime faults (fatal to the current task only)
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarmonyError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        HarmonyError::TrackingUnavailable {
            message: message.into(),
        }
    }

    pub fn report_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        HarmonyError::TrackingReportFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// True for errors that only degrade telemetry.
    pub fn is_telemetry(&self) -> bool {
        matches!(
            self,
            HarmonyError::TrackingUnavailable { .. } | HarmonyError::TrackingReportFailed { .. }
        )
    }
}
