use shared::{error::DomainError, protocol::EngineIntent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to encode {intent} request: {source}")]
    Encode {
        intent: EngineIntent,
        source: serde_json::Error,
    },
    #[error("failed to reach engine endpoint {intent}: {source}")]
    Transport {
        intent: EngineIntent,
        source: reqwest::Error,
    },
    #[error("engine returned HTTP {status} for {intent}: {body}")]
    HttpStatus {
        intent: EngineIntent,
        status: u16,
        body: String,
    },
    #[error("invalid {intent} response payload: {source}")]
    Decode {
        intent: EngineIntent,
        source: serde_json::Error,
    },
    #[error("engine returned an empty body for {intent}")]
    EmptyBody { intent: EngineIntent },
    #[error("could not hand {intent} request to the engine worker: {reason}")]
    Dispatch {
        intent: EngineIntent,
        reason: String,
    },
    #[error("engine returned an invalid dataset: {0}")]
    InvalidDataset(#[from] DomainError),
}

impl EngineError {
    /// True when the engine could not be reached at all, as opposed to a bad reply.
    pub fn is_connectivity(&self) -> bool {
        match self {
            EngineError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            EngineError::Dispatch { .. } => true,
            _ => false,
        }
    }
}
