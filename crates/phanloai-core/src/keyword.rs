//! Literal keyword scoring layer
//!
//! The cheapest cascade layer. Scores every category by keyword presence in
//! the accent-stripped description, with bonuses for match specificity,
//! multiple corroborating keywords, and amount plausibility, then converts
//! the score vector to probabilities with a softmax. Typos and teencode the
//! literal matching misses are the fuzzy layer's job.

use std::sync::Arc;

use tracing::debug;

use crate::calibrate::{softmax, top_candidates};
use crate::catalog::CategoryCatalog;
use crate::models::{ClassificationRequest, LayerOutput};
use crate::normalize::{basic, exact_token_match};

/// Raw score for a keyword found as a whole token
const EXACT_MATCH_SCORE: f64 = 2.0;
/// Raw score for a keyword found only as a substring
const SUBSTRING_MATCH_SCORE: f64 = 1.0;
/// Bonus for keywords longer than five characters (more specific)
const LONG_KEYWORD_BONUS: f64 = 0.5;
/// Per-match bonus when several keywords of one category corroborate
const CONTEXT_BONUS: f64 = 0.5;
/// Bonus when the amount sits in the category's typical range
const AMOUNT_BONUS: f64 = 0.3;
/// Nominal score for the fallback bucket when nothing matches anywhere
const FALLBACK_SCORE: f64 = 0.5;
/// Substring credit below this keyword length is noise ("be" matches "benh")
const MIN_SUBSTRING_KEYWORD_CHARS: usize = 3;

/// Scores categories by literal keyword presence.
pub struct KeywordClassifier {
    catalog: Arc<CategoryCatalog>,
    /// Per category: (normalized keyword, original keyword)
    keywords: Vec<Vec<(String, String)>>,
}

impl KeywordClassifier {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        let keywords = catalog
            .iter()
            .map(|c| {
                c.keywords
                    .iter()
                    .map(|k| (basic(k), k.clone()))
                    .filter(|(norm, _)| !norm.is_empty())
                    .collect()
            })
            .collect();
        Self { catalog, keywords }
    }

    pub fn classify(&self, request: &ClassificationRequest) -> LayerOutput {
        let text = basic(&request.description);
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
                } else if kw_chars >= MIN_SUBSTRING_KEYWORD_CHARS && text.contains(keyword.as_str())
                {
                    score += SUBSTRING_MATCH_SCORE;
                } else {
                    continue;
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
        let (best_index, confidence) = argmax(&probabilities);
        let alternatives = top_candidates(&probabilities, &self.catalog, 3);

        let best_matched = &matched_by_category[best_index];
        let explanation = if best_matched.is_empty() {
            "Model-based prediction (no keyword match)".to_string()
        } else {
            format!("Matched keywords: {}", best_matched.join(", "))
        };

        debug!(
            description = %request.description,
            best = %self.catalog.by_index(best_index).name,
            confidence,
            "keyword layer scored"
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

pub(crate) fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, v)| {
            if v > acc.1 {
                (i, v)
            } else {
                acc
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(Arc::new(CategoryCatalog::vietnamese_defaults()))
    }

    #[test]
    fn test_exact_keyword_match_wins() {
        let c = classifier();
        let output = c.classify(&ClassificationRequest::new("starbucks cafe sáng").with_amount(45_000.0));
        let best = c.catalog.by_index(output.best_index);
        assert_eq!(best.name, "Ăn uống");
        assert!(output.explanation.contains("cafe"));
        assert!(output.explanation.contains("starbucks"));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let c = classifier();
        let output = c.classify(&ClassificationRequest::new("grab di lam"));
        let probs = softmax(&output.scores, 1.0);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_match_falls_back_to_other() {
        let c = classifier();
        let output = c.classify(&ClassificationRequest::new("zzzz qqqq"));
        assert_eq!(output.best_index, c.catalog.other_index());
        assert_eq!(output.scores[c.catalog.other_index()], FALLBACK_SCORE);
        assert!(output.explanation.contains("no keyword match"));
    }

    #[test]
    fn test_amount_bonus_applies_inside_range() {
        let c = classifier();
        let without = c.classify(&ClassificationRequest::new("an trua van phong"));
        let with = c.classify(&ClassificationRequest::new("an trua van phong").with_amount(60_000.0));
        let food = c.catalog.index_of(1).unwrap();
        assert!(with.scores[food] > without.scores[food]);
    }

    #[test]
    fn test_context_bonus_for_multiple_keywords() {
        let c = classifier();
        let one = c.classify(&ClassificationRequest::new("com"));
        let two = c.classify(&ClassificationRequest::new("com pho"));
        let food = c.catalog.index_of(1).unwrap();
        // two exact matches plus the context bonus beat a single match doubled
        assert!(two.scores[food] > 2.0 * one.scores[food]);
    }

    #[test]
    fn test_short_keywords_get_no_substring_credit() {
        let c = classifier();
        // "be" (the ride-hailing app) is embedded in "benh" but must not
        // count as a transport substring hit
        let output = c.classify(&ClassificationRequest::new("kham benh dinh ky"));
        let best = c.catalog.by_index(output.best_index);
        assert_eq!(best.name, "Sức khỏe");
    }

    #[test]
    fn test_typo_is_not_matched_literally() {
        let c = classifier();
        let output = c.classify(&ClassificationRequest::new("caphe szang"));
        assert_eq!(output.best_index, c.catalog.other_index());
    }
}
