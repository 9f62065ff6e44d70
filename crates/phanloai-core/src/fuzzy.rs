//! Fuzzy matching layer
//!
//! Second cascade layer. Re-normalizes the description through the full
//! pipeline (accents, teencode, whitespace) and re-runs the catalog with
//! similarity matching instead of literal search, so "caphe szang" still
//! lands on the food category. Precision is lower than the literal layer,
//! so the reported confidence is capped.

use std::sync::Arc;

use tracing::debug;

use crate::calibrate::{softmax, top_candidates};
use crate::catalog::CategoryCatalog;
use crate::keyword::argmax;
use crate::models::{ClassificationRequest, LayerOutput};
use crate::normalize::{exact_token_match, normalize, window_similarity};

const EXACT_MATCH_SCORE: f64 = 2.0;
const LONG_KEYWORD_BONUS: f64 = 0.5;
const CONTEXT_BONUS: f64 = 0.5;
const AMOUNT_BONUS: f64 = 0.3;
const FALLBACK_SCORE: f64 = 0.5;

/// Fuzzy layer tuning
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    /// Minimum similarity for a keyword to count as matched
    pub similarity_threshold: f64,
    /// Upper bound on the confidence this layer may report
    pub confidence_ceiling: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.65,
            confidence_ceiling: 0.85,
        }
    }
}

/// Scores categories by keyword similarity over the fully normalized text.
pub struct FuzzyClassifier {
    catalog: Arc<CategoryCatalog>,
    /// Per category: (normalized keyword, original keyword)
    keywords: Vec<Vec<(String, String)>>,
    config: FuzzyConfig,
}

impl FuzzyClassifier {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self::with_config(catalog, FuzzyConfig::default())
    }

    pub fn with_config(catalog: Arc<CategoryCatalog>, config: FuzzyConfig) -> Self {
        let keywords = catalog
            .iter()
            .map(|c| {
                c.keywords
                    .iter()
                    .map(|k| (normalize(k), k.clone()))
                    .filter(|(norm, _)| !norm.is_empty())
                    .collect()
            })
            .collect();
        Self {
            catalog,
            keywords,
            config,
        }
    }

    pub fn confidence_ceiling(&self) -> f64 {
        self.config.confidence_ceiling
    }

    pub fn classify(&self, request: &ClassificationRequest) -> LayerOutput {
        let text = normalize(&request.description);
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let mut scores = vec![0.0f64; self.catalog.len()];
        let mut matched_by_category: Vec<Vec<String>> = vec![Vec::new(); self.catalog.len()];

        for (index, category) in self.catalog.iter().enumerate() {
            let matched = &mut matched_by_category[index];
            let mut score = 0.0f64;

            for (keyword, original) in &self.keywords[index] {
                let kw_chars = keyword.chars().count();
                if exact_token_match(&tokens, keyword) {
                    score += EXACT_MATCH_SCORE;
                } else {
                    let sim = window_similarity(&tokens, keyword);
                    if sim < self.config.similarity_threshold {
                        continue;
                    }
                    score += EXACT_MATCH_SCORE * sim;
                }
                if kw_chars > 5 {
                    score += LONG_KEYWORD_BONUS;
                }
                matched.push(original.clone());
            }

            if matched.len() > 1 {
                score += CONTEXT_BONUS * matched.len() as f64;
            }
            if let (Some(amount), Some(range)) = (request.amount, category.typical_range) {
                if range.contains(amount) {
                    score += AMOUNT_BONUS;
                }
            }

            scores[index] = score * category.weight;
        }

        if scores.iter().all(|&s| s == 0.0) {
            scores[self.catalog.other_index()] = FALLBACK_SCORE;
        }

        let probabilities = softmax(&scores, 1.0);
        let (best_index, raw_confidence) = argmax(&probabilities);
        let confidence = raw_confidence.min(self.config.confidence_ceiling);
        let alternatives = top_candidates(&probabilities, &self.catalog, 3);

        let best_matched = &matched_by_category[best_index];
        let explanation = if best_matched.is_empty() {
            "Model-based prediction (no similar keyword)".to_string()
        } else {
            format!("Similar to keywords: {}", best_matched.join(", "))
        };

        debug!(
            description = %request.description,
            best = %self.catalog.by_index(best_index).name,
            confidence,
            "fuzzy layer scored"
        );

        LayerOutput {
            scores,
            best_index,
            confidence,
            alternatives,
            explanation,
        }
    }
}
