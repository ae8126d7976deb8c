use async_trait::async_trait;
use base64::Engine;
use garde::Validate;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::recognition::{BoundingBox, TextRegion};

/// Output of one engine invocation: regions in reading order plus the
/// engine's version tag.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub regions: Vec<TextRegion>,
    pub engine_version: String,
}

/// A text-recognition capability: image bytes in, recognized regions out.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<EngineOutput, OcrError>;

    /// Cheap liveness probe of the underlying engine.
    async fn health_check(&self) -> Result<(), OcrError>;
}

/// Client for a sidecar OCR model server.
///
/// The shared HTTP client is safe to use from every worker concurrently;
/// engine instances live in the model server, so the worker pool is the only
/// bound on concurrent invocations. No engine state is held in this process.
pub struct RemoteOcrEngine {
    http: Client,
    base_url: String,
    languages: Vec<String>,
}

#[derive(Serialize)]
struct RecognizeRequest {
    image: String,
    languages: Vec<String>,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    version: String,
    regions: Vec<WireRegion>,
}

#[derive(Deserialize)]
struct WireRegion {
    #[serde(rename = "box")]
    bbox: [f64; 4],
    text: String,
    confidence: f64,
}

impl RemoteOcrEngine {
    pub fn new(base_url: &str, languages: Vec<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            languages,
        }
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    /// Send an image to the model server and map its response onto regions.
    async fn recognize(&self, image_bytes: &[u8]) -> Result<EngineOutput, OcrError> {
        let request_body = RecognizeRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            languages: self.languages.clone(),
        };

        let response = self
            .http
            .post(format!("{}/v1/recognize", self.base_url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(OcrError::EngineUnavailable(format!(
                "engine returned {status}"
            )));
        }
        if status.is_client_error() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(OcrError::InvalidImage(format!("{status}: {detail}")));
        }

        let payload: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;

        let regions: Vec<TextRegion> = payload
            .regions
            .into_iter()
            .map(|r| TextRegion {
                bbox: BoundingBox {
                    x0: r.bbox[0],
                    y0: r.bbox[1],
                    x1: r.bbox[2],
                    y1: r.bbox[3],
                },
                text: r.text,
                confidence: r.confidence,
            })
            .collect();

        for region in &regions {
            region
                .validate()
                .map_err(|e| OcrError::InvalidResponse(format!("region out of contract: {e}")))?;
        }

        Ok(EngineOutput {
            regions,
            engine_version: payload.version,
        })
    }

    async fn health_check(&self) -> Result<(), OcrError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OcrError::EngineUnavailable(format!(
                "engine health returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("unsupported or unreadable image: {0}")]
    InvalidImage(String),

    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine returned a malformed response: {0}")]
    InvalidResponse(String),
}

impl OcrError {
    /// Only engine-availability failures are worth another attempt.
    pub fn retryable(&self) -> bool {
        matches!(self, OcrError::EngineUnavailable(_))
    }
}
