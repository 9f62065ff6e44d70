//! General LLM backend
//!
//! Last-resort cascade layer. Prompts an Ollama-style generate endpoint with
//! the catalog's category names and the transaction text, then converts the
//! model's picked category + self-reported confidence into a raw score
//! vector the calibrator can treat like any other layer's output.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CategoryCatalog;
use crate::error::{Error, Result};
use crate::models::{ScoreRequest, ScoreResponse};
use crate::normalize::{normalize, similarity};

use super::parsing::extract_json;
use super::ModelBackend;

/// Raw score given to the picked category at confidence 1.0.
///
/// Sized so a confident model answer clears the calibrated review gate at
/// the default temperature while a hedged answer does not.
const SCORE_SCALE: f64 = 6.0;

/// Minimum name similarity to accept a slightly mangled category answer
const NAME_MATCH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    category: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Clone)]
pub struct LlmBackend {
    http_client: Client,
    base_url: String,
    model: String,
    /// (id, display name, normalized name) per catalog category, in order
    categories: Vec<(i64, String, String)>,
}

impl LlmBackend {
    pub fn new(base_url: &str, model: &str, catalog: &CategoryCatalog) -> Self {
        let categories = catalog
            .iter()
            .map(|c| (c.id, c.name.clone(), normalize(&c.name)))
            .collect();
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            categories,
        }
    }

    /// Create from environment variables; None when no host is configured.
    pub fn from_env(catalog: &CategoryCatalog) -> Option<Self> {
        let host = std::env::var("LLM_CLASSIFIER_HOST").ok()?;
        let model =
            std::env::var("LLM_CLASSIFIER_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model, catalog))
    }

    fn build_prompt(&self, request: &ScoreRequest) -> String {
        let mut prompt = String::from(
            "You classify Vietnamese personal finance transactions. \
             Pick exactly one category from this list:\n",
        );
        for (_, name, _) in &self.categories {
            prompt.push_str("- ");
            prompt.push_str(name);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "\nTransaction: \"{}\"\n",
            request.normalized_text
        ));
        if let Some(amount) = request.amount {
            prompt.push_str(&format!("Amount: {:.0} VND\n", amount));
        }
        prompt.push_str(
            "\nAnswer with JSON only: {\"category\": \"<name from the list>\", \
             \"confidence\": <number between 0 and 1>}",
        );
        prompt
    }

    /// Map the model's category answer to a catalog index, tolerating
    /// accent loss and small misspellings.
    fn resolve_category(&self, answer: &str) -> Option<usize> {
        let normalized = normalize(answer);

        if let Some(index) = self
            .categories
            .iter()
            .position(|(_, _, norm)| *norm == normalized)
        {
            return Some(index);
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, (_, _, norm)) in self.categories.iter().enumerate() {
            let s = similarity(norm, &normalized);
            if s >= NAME_MATCH_THRESHOLD && best.map_or(true, |(_, b)| s > b) {
                best = Some((index, s));
            }
        }
        best.map(|(index, _)| index)
    }
}

#[async_trait]
impl ModelBackend for LlmBackend {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = self.build_prompt(request);
        debug!(url = %url, model = %self.model, "calling LLM classifier");

        let start = Instant::now();
        let response = self
            .http_client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let verdict: LlmVerdict = extract_json(&response.response)?;
        let index = self.resolve_category(&verdict.category).ok_or_else(|| {
            Error::Backend(format!("model answered unknown category '{}'", verdict.category))
        })?;

        let mut raw_score_vector = vec![0.0; self.categories.len()];
        raw_score_vector[index] = SCORE_SCALE * verdict.confidence.clamp(0.0, 1.0);

        Ok(ScoreResponse {
            category_id: self.categories[index].0,
            raw_score_vector,
            elapsed_ms,
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
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

    fn backend() -> LlmBackend {
        LlmBackend::new(
            "http://localhost:11434",
            "llama3.2",
            &CategoryCatalog::vietnamese_defaults(),
        )
    }

    #[test]
    fn test_prompt_lists_categories_and_text() {
        let b = backend();
        let prompt = b.build_prompt(&ScoreRequest {
            normalized_text: "ca phe sang".to_string(),
            amount: Some(45_000.0),
            user_id: None,
        });
        assert!(prompt.contains("- Ăn uống"));
        assert!(prompt.contains("ca phe sang"));
        assert!(prompt.contains("45000 VND"));
    }

    #[test]
    fn test_resolve_category_tolerates_accent_loss() {
        let b = backend();
        assert_eq!(b.resolve_category("Ăn uống"), Some(0));
        assert_eq!(b.resolve_category("an uong"), Some(0));
        assert_eq!(b.resolve_category("An Uong"), Some(0));
        // a near miss still resolves through similarity
        assert_eq!(b.resolve_category("an uogn"), Some(0));
        assert_eq!(b.resolve_category("totally unrelated"), None);
    }
}
