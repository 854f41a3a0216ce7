use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use shared::{
    domain::{AxisLimits, DataPoint},
    protocol::{DatasetResponse, EngineIntent, EngineRequest, StatusResponse},
};
use tracing::{debug, warn};
use url::Url;

pub mod config;
pub mod error;
pub mod mapping;
pub mod render;
pub mod session;

pub use error::EngineError;
pub use session::{
    drive, Dataset, DriveReport, Notice, NoticeSeverity, SessionController, SessionEffect,
    SessionPhase, SessionState, VisualOutput,
};

const JSON_CONTENT_TYPE: &str = "application/json";
const ERROR_BODY_PREVIEW_LEN: usize = 256;

/// Opaque frame rendered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineImage {
    bytes: Arc<[u8]>,
    content_type: Option<String>,
}

impl EngineImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    Image(EngineImage),
    Status(StatusResponse),
    Dataset {
        points: Vec<DataPoint>,
        limits: AxisLimits,
    },
}

impl EngineResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineResponse::Image(_) => "image",
            EngineResponse::Status(_) => "status",
            EngineResponse::Dataset { .. } => "dataset",
        }
    }
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| value.to_ascii_lowercase().contains(JSON_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Decide what an engine reply is from its declared content type, never from the intent alone.
pub fn classify_response(
    intent: EngineIntent,
    http_status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<EngineResponse, EngineError> {
    if is_json_content_type(content_type) {
        if intent == EngineIntent::GenerateDataset {
            match serde_json::from_slice::<DatasetResponse>(body) {
                Ok(dataset) => {
                    let (points, limits) = dataset.into_parts()?;
                    return Ok(EngineResponse::Dataset { points, limits });
                }
                Err(err) => {
                    debug!(%intent, %err, "json reply is not a dataset; reading as status");
                }
            }
        }
        let status = serde_json::from_slice::<StatusResponse>(body)
            .map_err(|source| EngineError::Decode { intent, source })?;
        return Ok(EngineResponse::Status(status));
    }

    if !(200..300).contains(&http_status) {
        let preview = String::from_utf8_lossy(body);
        let preview: String = preview.chars().take(ERROR_BODY_PREVIEW_LEN).collect();
        return Err(EngineError::HttpStatus {
            intent,
            status: http_status,
            body: preview,
        });
    }

    if body.is_empty() {
        return Err(EngineError::EmptyBody { intent });
    }

    Ok(EngineResponse::Image(EngineImage::new(
        body.to_vec(),
        content_type.map(str::to_string),
    )))
}

#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn send(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError>;
}

#[derive(Debug, Clone)]
pub struct EngineClient {
    http: Client,
    base_url: Url,
}

impl EngineClient {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Self::with_http_client(Client::new(), base_url)
    }

    pub fn with_http_client(http: Client, base_url: &str) -> Result<Self, EngineError> {
        let mut parsed = Url::parse(base_url.trim()).map_err(|source| EngineError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        // `Url::join` replaces the last path segment unless the path ends in '/'.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint_url(&self, intent: EngineIntent) -> Result<Url, EngineError> {
        self.base_url
            .join(intent.endpoint())
            .map_err(|source| EngineError::InvalidUrl {
                url: format!("{}{}", self.base_url, intent.endpoint()),
                source,
            })
    }

    pub async fn send(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        let intent = request.intent();
        let url = self.endpoint_url(intent)?;
        let body = request
            .body()
            .map_err(|source| EngineError::Encode { intent, source })?;

        debug!(%intent, %url, "sending engine request");
        let builder = self.http.post(url);
        let builder = match &body {
            Some(body) => builder.json(body),
            None => builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE),
        };
        let response = builder
            .send()
            .await
            .map_err(|source| EngineError::Transport { intent, source })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|source| EngineError::Transport { intent, source })?;

        let classified = classify_response(intent, status.as_u16(), content_type.as_deref(), &bytes);
        match &classified {
            Ok(reply) => debug!(%intent, status = status.as_u16(), kind = reply.kind(), "engine replied"),
            Err(err) => warn!(%intent, status = status.as_u16(), %err, "engine reply rejected"),
        }
        classified
    }
}

#[async_trait]
impl EngineHandle for EngineClient {
    async fn send(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        EngineClient::send(self, request).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
