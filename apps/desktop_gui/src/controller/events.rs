//! UI/backend events and error modeling for desktop GUI controller.

use client_core::{EngineError, EngineResponse, Notice};
use shared::protocol::EngineIntent;

pub enum UiEvent {
    Info(String),
    Error(UiError),
    EngineCompleted {
        intent: EngineIntent,
        outcome: Result<EngineResponse, EngineError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Validation,
    Engine,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    EngineRequest(EngineIntent),
    ExportFrame,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("failed to reach")
            || message_lower.contains("engine worker")
            || message_lower.contains("disconnected")
            || message_lower.contains("http ")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("please select")
            || message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("must be")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("engine") {
            UiErrorCategory::Engine
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Map a session notice onto the banner model; informational notices yield `None`.
    pub fn from_notice(notice: &Notice) -> Option<Self> {
        let (category, context) = match notice {
            Notice::EngineReported { intent, .. } | Notice::UnexpectedResponse { intent, .. } => {
                (UiErrorCategory::Engine, UiErrorContext::EngineRequest(*intent))
            }
            Notice::TransportFailure { intent, .. } => (
                UiErrorCategory::Transport,
                UiErrorContext::EngineRequest(*intent),
            ),
            Notice::RequestInFlight(intent) => (
                UiErrorCategory::Validation,
                UiErrorContext::EngineRequest(*intent),
            ),
            Notice::ManualPlacementUnavailable => (UiErrorCategory::Engine, UiErrorContext::General),
            other if other.is_validation() => (UiErrorCategory::Validation, UiErrorContext::General),
            _ => return None,
        };
        Some(Self {
            category,
            context,
            message: notice.to_string(),
        })
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
