//! Image generation provider client
//!
//! The provider is an external managed service; this module is
//! request/response glue only. Provider failures surface as internal
//! errors with the detail kept in the logs.

use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::types::{Result, TurnstileError};

/// Generates card art for a prompt
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Bytes>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
}

/// HTTP client for the configured provider endpoint
pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageGenerator {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| TurnstileError::Config(format!("image client build failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<Bytes> {
        debug!(len = prompt.len(), "requesting image generation");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateBody { prompt })
            .send()
            .await
            .map_err(|e| {
                error!("image provider request failed: {}", e);
                TurnstileError::Internal("image provider unavailable".to_string())
            })?;

        if !response.status().is_success() {
            error!("image provider returned {}", response.status());
            return Err(TurnstileError::Internal(
                "image provider rejected the request".to_string(),
            ));
        }

        let data = response.bytes().await.map_err(|e| {
            error!("image provider body read failed: {}", e);
            TurnstileError::Internal("image provider unavailable".to_string())
        })?;
        Ok(data)
    }
}

/// Dev-mode stand-in that emits a fixed byte payload
pub struct StubImageGenerator;

#[async_trait::async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Bytes> {
        Ok(Bytes::from_static(b"turnstile-stub-image"))
    }
}
