//! Feedback learning
//!
//! Users correct predictions; this module turns those corrections into three
//! signals:
//! - per-user patterns ("this user keeps moving my Ăn uống picks to Mua sắm")
//!   that dampen confidence and, when strong enough, override a prediction;
//! - ground-truth accuracy counters for the metrics recorder;
//! - cross-user correction tallies that surface keyword gaps in the catalog.
//!
//! Patterns live in a bounded in-process cache. A correction toward a new
//! target replaces the old pattern outright: only the newest behavior is
//! trusted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::models::{CascadeLayer, CorrectionEvent, CorrectionStats, UserPattern};
use crate::normalize::normalize;
use crate::store::CorrectionStore;

/// Occurrences before a pattern dampens confidence
const ADJUSTMENT_MIN_OCCURRENCES: u32 = 3;
/// Confidence multiplier once a pattern is established
const ADJUSTMENT_FACTOR: f64 = 0.80;
/// Occurrences before a pattern overrides the predicted category
const OVERRIDE_MIN_OCCURRENCES: u32 = 5;
/// Cross-user tallies below this count stay out of the gap report
const REPORT_MIN_COUNT: u32 = 3;
/// Bounded cache sizes; oldest key evicted first
const MAX_PATTERNS: usize = 10_000;
const MAX_STATS: usize = 10_000;

/// Tokens too generic to propose as catalog keywords
const STOP_WORDS: &[&str] = &[
    "va", "la", "cua", "o", "mot", "cac", "nhung", "da", "se", "dang", "bi", "duoc", "trong",
    "voi", "den", "tu", "cho", "di", "ve", "em", "anh", "chi", "cai", "con",
];

/// A catalog keyword gap surfaced from repeated cross-user corrections
#[derive(Debug, Clone)]
pub struct KeywordGap {
    pub description: String,
    pub predicted_category: i64,
    pub corrected_category: i64,
    pub count: u32,
    /// Description tokens that could become keywords of the corrected category
    pub candidate_keywords: Vec<String>,
}

#[derive(Debug, Default)]
struct LearnerState {
    patterns: HashMap<(String, i64), UserPattern>,
    pattern_order: VecDeque<(String, i64)>,
    stats: HashMap<(String, i64, i64), CorrectionStats>,
    stats_order: VecDeque<(String, i64, i64)>,
}

/// Learns per-user correction behavior and catalog keyword gaps.
pub struct FeedbackLearner {
    metrics: Arc<MetricsRecorder>,
    state: Mutex<LearnerState>,
}

impl FeedbackLearner {
    pub fn new(metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            metrics,
            state: Mutex::new(LearnerState::default()),
        }
    }

    /// Record a user's verdict on a prediction.
    ///
    /// A confirmation (`predicted == corrected`) only feeds the accuracy
    /// counters. A real correction additionally appends an immutable event
    /// to the store, upserts the user's pattern, and bumps the cross-user
    /// tally.
    pub fn record_correction(
        &self,
        store: &dyn CorrectionStore,
        user_id: &str,
        description: &str,
        predicted: i64,
        corrected: i64,
        layer: CascadeLayer,
    ) -> Result<()> {
        if predicted == corrected {
            self.metrics.record_feedback(true);
            return Ok(());
        }
        self.metrics.record_feedback(false);

        let normalized = normalize(description);
        store.append(&CorrectionEvent {
            user_id: user_id.to_string(),
            description: normalized.clone(),
            predicted_category: predicted,
            corrected_category: corrected,
            layer,
            occurred_at: Utc::now(),
        })?;

        let mut state = self.state.lock().unwrap();

        let pattern_key = (user_id.to_string(), predicted);
        let pattern_missing = match state.patterns.get_mut(&pattern_key) {
            Some(pattern) if pattern.target_category == corrected => {
                pattern.occurrences += 1;
                pattern.last_seen = Utc::now();
                debug!(
                    user = user_id,
                    source = predicted,
                    target = corrected,
                    occurrences = pattern.occurrences,
                    "reinforced user pattern"
                );
                false
            }
            Some(pattern) => {
                // the user changed their mind; only the newest target counts
                info!(
                    user = user_id,
                    source = predicted,
                    old_target = pattern.target_category,
                    new_target = corrected,
                    "replacing user pattern"
                );
                *pattern = new_pattern(user_id, predicted, corrected);
                false
            }
            None => true,
        };
        if pattern_missing {
            if state.patterns.len() >= MAX_PATTERNS {
                if let Some(oldest) = state.pattern_order.pop_front() {
                    state.patterns.remove(&oldest);
                }
            }
            state
                .patterns
                .insert(pattern_key.clone(), new_pattern(user_id, predicted, corrected));
            state.pattern_order.push_back(pattern_key);
        }

        let stats_key = (normalized.clone(), predicted, corrected);
        let stats_missing = match state.stats.get_mut(&stats_key) {
            Some(entry) => {
                entry.count += 1;
                false
            }
            None => true,
        };
        if stats_missing {
            if state.stats.len() >= MAX_STATS {
                if let Some(oldest) = state.stats_order.pop_front() {
                    state.stats.remove(&oldest);
                }
            }
            state.stats.insert(
                stats_key.clone(),
                CorrectionStats {
                    description: normalized,
                    predicted_category: predicted,
                    corrected_category: corrected,
                    count: 1,
                },
            );
            state.stats_order.push_back(stats_key);
        }

        Ok(())
    }

    /// Confidence multiplier for a prediction of `category_id` for this user.
    ///
    /// 0.80 once the user has corrected that category three or more times,
    /// 1.0 otherwise.
    pub fn confidence_adjustment(&self, user_id: &str, category_id: i64) -> f64 {
        let state = self.state.lock().unwrap();
        match state.patterns.get(&(user_id.to_string(), category_id)) {
            Some(p) if p.occurrences >= ADJUSTMENT_MIN_OCCURRENCES => ADJUSTMENT_FACTOR,
            _ => 1.0,
        }
    }

    /// The category this user's history says `predicted` should become,
    /// once the pattern is strong enough (five or more corrections).
    pub fn suggested_category(&self, user_id: &str, predicted: i64) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state
            .patterns
            .get(&(user_id.to_string(), predicted))
            .filter(|p| p.occurrences >= OVERRIDE_MIN_OCCURRENCES)
            .map(|p| p.target_category)
    }

    /// Current pattern for a (user, source category) pair, if any.
    pub fn pattern(&self, user_id: &str, source_category: i64) -> Option<UserPattern> {
        let state = self.state.lock().unwrap();
        state
            .patterns
            .get(&(user_id.to_string(), source_category))
            .cloned()
    }

    /// Cross-user correction tallies worth acting on, with candidate
    /// keywords extracted from the normalized description.
    pub fn keyword_gap_report(&self) -> Vec<KeywordGap> {
        let state = self.state.lock().unwrap();
        let mut gaps: Vec<KeywordGap> = state
            .stats
            .values()
            .filter(|s| s.count >= REPORT_MIN_COUNT)
            .map(|s| KeywordGap {
                description: s.description.clone(),
                predicted_category: s.predicted_category,
                corrected_category: s.corrected_category,
                count: s.count,
                candidate_keywords: candidate_keywords(&s.description),
            })
            .collect();
        gaps.sort_by(|a, b| b.count.cmp(&a.count));
        gaps
    }
}

fn new_pattern(user_id: &str, source: i64, target: i64) -> UserPattern {
    UserPattern {
        user_id: user_id.to_string(),
        source_category: source,
        target_category: target,
        occurrences: 1,
        last_seen: Utc::now(),
    }
}

fn candidate_keywords(normalized_description: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for token in normalized_description.split_whitespace() {
        if token.chars().count() < 2 {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOP_WORDS.contains(&token) {
            continue;
        }
        if !seen.iter().any(|t| t == token) {
            seen.push(token.to_string());
        }
    }
    seen
}
