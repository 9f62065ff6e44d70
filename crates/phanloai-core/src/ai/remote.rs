//! Fast specialized classifier service backend
//!
//! HTTP client for the dedicated scoring service. The service owns its own
//! model; this side only speaks the wire contract: POST /classify with a
//! normalized description, get back a raw score vector aligned with the
//! shared catalog.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::Result;
use crate::models::{ScoreRequest, ScoreResponse};

use super::ModelBackend;

#[derive(Clone)]
pub struct RemoteBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl RemoteBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables; None when no host is configured.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("FAST_CLASSIFIER_HOST").ok()?;
        let model = std::env::var("FAST_CLASSIFIER_MODEL")
            .unwrap_or_else(|_| "phobert-finance".to_string());
        Some(Self::new(&host, &model))
    }
}

#[async_trait]
impl ModelBackend for RemoteBackend {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse> {
        let url = format!("{}/classify", self.base_url);
        debug!(url = %url, text = %request.normalized_text, "calling fast classifier");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<ScoreResponse>()
            .await?;

        Ok(response)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let backend = RemoteBackend::new("http://localhost:8090/", "phobert-finance");
        assert_eq!(backend.host(), "http://localhost:8090");
    }
}
