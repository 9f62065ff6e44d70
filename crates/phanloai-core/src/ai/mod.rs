//! External classifier boundary
//!
//! The two expensive cascade layers live out of process: a fast specialized
//! scoring service and a general LLM. Both are consumed through the same
//! narrow contract ([`crate::models::ScoreRequest`] in,
//! [`crate::models::ScoreResponse`] out) and both are optional at runtime:
//! an unreachable endpoint is a normal condition the cascade treats as "not
//! confident", never an error surfaced to the caller.
//!
//! # Architecture
//!
//! - `ModelBackend` trait: the interface every backend implements
//! - `ModelClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `RemoteBackend` (scoring service),
//!   `LlmBackend` (Ollama-style generate endpoint), `MockBackend` (tests)
//!
//! # Configuration
//!
//! Environment variables:
//! - `FAST_CLASSIFIER_HOST`: scoring service URL
//! - `FAST_CLASSIFIER_MODEL`: model label for metrics (default: phobert-finance)
//! - `LLM_CLASSIFIER_HOST`: LLM server URL
//! - `LLM_CLASSIFIER_MODEL`: model name (default: llama3.2)

mod llm;
mod mock;
pub mod parsing;
mod remote;

pub use llm::LlmBackend;
pub use mock::MockBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;

use crate::catalog::CategoryCatalog;
use crate::error::Result;
use crate::models::{ScoreRequest, ScoreResponse};

/// Trait defining the interface for external classifier backends
///
/// Backends must be Send + Sync so the cascade can call them from any task.
/// Timeouts are the caller's concern; implementations just do the call.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Score a normalized description against the shared catalog.
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse>;

    /// Whether the backend currently answers at all.
    async fn health_check(&self) -> bool;

    /// Model name (for metrics and explanations)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete external classifier client
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ModelClient {
    /// Fast specialized scoring service (HTTP)
    Remote(RemoteBackend),
    /// General LLM behind an Ollama-style generate endpoint
    Llm(LlmBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl ModelClient {
    /// The fast service layer, from `FAST_CLASSIFIER_*` variables.
    ///
    /// Returns None when no host is configured; the cascade then simply
    /// skips that layer.
    pub fn fast_from_env() -> Option<Self> {
        RemoteBackend::from_env().map(ModelClient::Remote)
    }

    /// The LLM layer, from `LLM_CLASSIFIER_*` variables.
    ///
    /// The catalog is needed up front so the prompt can enumerate the
    /// category names the model may answer with.
    pub fn llm_from_env(catalog: &CategoryCatalog) -> Option<Self> {
        LlmBackend::from_env(catalog).map(ModelClient::Llm)
    }
}

#[async_trait]
impl ModelBackend for ModelClient {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse> {
        match self {
            ModelClient::Remote(b) => b.score(request).await,
            ModelClient::Llm(b) => b.score(request).await,
            ModelClient::Mock(b) => b.score(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ModelClient::Remote(b) => b.health_check().await,
            ModelClient::Llm(b) => b.health_check().await,
            ModelClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ModelClient::Remote(b) => b.model(),
            ModelClient::Llm(b) => b.model(),
            ModelClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            ModelClient::Remote(b) => b.host(),
            ModelClient::Llm(b) => b.host(),
            ModelClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_roundtrip() {
        let client = ModelClient::Mock(MockBackend::new(1, vec![6.0, 0.0, 0.0]));
        assert_eq!(client.model(), "mock");
        assert!(client.health_check().await);

        let response = client
            .score(&ScoreRequest {
                normalized_text: "ca phe sang".to_string(),
                amount: None,
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(response.category_id, 1);
        assert_eq!(response.raw_score_vector.len(), 3);
    }
}
