//! Mock backend for testing

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ScoreRequest, ScoreResponse};

use super::ModelBackend;

/// Canned-response backend for unit and integration tests.
#[derive(Clone)]
pub struct MockBackend {
    category_id: i64,
    scores: Vec<f64>,
    fail: bool,
}

impl MockBackend {
    /// Always answer with the given category and raw score vector.
    pub fn new(category_id: i64, scores: Vec<f64>) -> Self {
        Self {
            category_id,
            scores,
            fail: false,
        }
    }

    /// Always fail, simulating an unreachable service.
    pub fn failing() -> Self {
        Self {
            category_id: 0,
            scores: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn score(&self, _request: &ScoreRequest) -> Result<ScoreResponse> {
        if self.fail {
            return Err(Error::Backend("mock backend configured to fail".to_string()));
        }
        Ok(ScoreResponse {
            category_id: self.category_id,
            raw_score_vector: self.scores.clone(),
            elapsed_ms: 1,
        })
    }

    async fn health_check(&self) -> bool {
        !self.fail
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_mock() {
        let backend = MockBackend::failing();
        assert!(!backend.health_check().await);
        let result = backend
            .score(&ScoreRequest {
                normalized_text: "x".to_string(),
                amount: None,
                user_id: None,
            })
            .await;
        assert!(matches!(result, Err(Error::Backend(_))));
    }
}
