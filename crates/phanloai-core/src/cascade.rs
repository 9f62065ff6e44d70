//! Classification cascade
//!
//! Runs the layers in fixed cost order, cheapest first:
//! keywords → fuzzy → external fast service → external LLM.
//!
//! Each attempt is calibrated and yields a tagged outcome: confident (stop
//! and emit), needs-escalation (keep as fallback, try the next layer), or
//! unavailable (timeout, connection failure, malformed response; try the
//! next layer). The cascade never moves back to a cheaper layer and never
//! hard-fails after input validation: when every layer is exhausted it
//! emits the last produced result flagged for human review, because
//! downstream transaction filing must not block on classification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::ai::{ModelBackend, ModelClient};
use crate::calibrate::{Calibration, ConfidenceCalibrator};
use crate::catalog::CategoryCatalog;
use crate::error::{Error, Result};
use crate::feedback::FeedbackLearner;
use crate::fuzzy::{FuzzyClassifier, FuzzyConfig};
use crate::keyword::KeywordClassifier;
use crate::metrics::MetricsRecorder;
use crate::models::{
    CascadeLayer, ClassificationRequest, ClassificationResult, LayerOutput, ScoreRequest,
    ScoredCategory,
};
use crate::normalize::normalize;

/// Cascade tuning
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Deadline for the fast specialized service
    pub fast_timeout: Duration,
    /// Deadline for the LLM layer
    pub llm_timeout: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            fast_timeout: Duration::from_millis(800),
            llm_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of running one layer, after calibration
enum LayerAttempt {
    Confident(ClassificationResult),
    NeedsEscalation(ClassificationResult),
    /// Timeout, connection failure, or malformed response
    Unavailable,
    /// No client configured for this layer
    NotConfigured,
}

/// Orchestrates the classification layers for one request at a time.
///
/// Requests are independent; a single cascade instance can serve any number
/// of them concurrently.
pub struct ClassificationCascade {
    catalog: Arc<CategoryCatalog>,
    keyword: KeywordClassifier,
    fuzzy: FuzzyClassifier,
    fast: Option<ModelClient>,
    llm: Option<ModelClient>,
    calibrator: ConfidenceCalibrator,
    metrics: Arc<MetricsRecorder>,
    learner: Option<Arc<FeedbackLearner>>,
    config: CascadeConfig,
}

impl ClassificationCascade {
    pub fn new(catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            keyword: KeywordClassifier::new(catalog.clone()),
            fuzzy: FuzzyClassifier::new(catalog.clone()),
            catalog,
            fast: None,
            llm: None,
            calibrator: ConfidenceCalibrator::default(),
            metrics: Arc::new(MetricsRecorder::new()),
            learner: None,
            config: CascadeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CascadeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_calibrator(mut self, calibrator: ConfidenceCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    pub fn with_fuzzy_config(mut self, config: FuzzyConfig) -> Self {
        self.fuzzy = FuzzyClassifier::with_config(self.catalog.clone(), config);
        self
    }

    /// Attach the fast specialized service layer.
    pub fn with_fast(mut self, client: ModelClient) -> Self {
        self.fast = Some(client);
        self
    }

    /// Attach the LLM layer.
    pub fn with_llm(mut self, client: ModelClient) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_learner(mut self, learner: Arc<FeedbackLearner>) -> Self {
        self.learner = Some(learner);
        self
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Classify one transaction description.
    ///
    /// The only error is invalid input (empty description with no amount);
    /// everything downstream degrades to a review-flagged result instead of
    /// failing.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationResult> {
        if request.description.trim().is_empty() && request.amount.is_none() {
            return Err(Error::InvalidData(
                "empty description with no amount".to_string(),
            ));
        }

        let mut fallback: Option<ClassificationResult> = None;

        for layer in CascadeLayer::ALL {
            match self.run_layer(layer, request).await {
                LayerAttempt::Confident(mut result) => {
                    self.apply_feedback(&mut result, request);
                    info!(
                        layer = %layer,
                        category = %result.category_name,
                        confidence = result.confidence,
                        "classification accepted"
                    );
                    return Ok(result);
                }
                LayerAttempt::NeedsEscalation(result) => {
                    debug!(layer = %layer, confidence = result.confidence, "escalating");
                    fallback = Some(result);
                }
                LayerAttempt::Unavailable => {
                    debug!(layer = %layer, "layer unavailable, escalating");
                }
                LayerAttempt::NotConfigured => {
                    debug!(layer = %layer, "layer not configured, skipping");
                }
            }
        }

        // exhausted: emit the best we have, flagged for review
        let mut result = fallback.ok_or_else(|| {
            Error::InvalidData("no cascade layer produced a result".to_string())
        })?;
        result.requires_human_review = true;
        self.apply_feedback(&mut result, request);
        info!(
            layer = %result.layer,
            category = %result.category_name,
            "cascade exhausted, emitting last result for review"
        );
        Ok(result)
    }

    async fn run_layer(&self, layer: CascadeLayer, request: &ClassificationRequest) -> LayerAttempt {
        let start = Instant::now();

        let output = match layer {
            CascadeLayer::Keywords => Some(self.keyword.classify(request)),
            CascadeLayer::Fuzzy => Some(self.fuzzy.classify(request)),
            CascadeLayer::ExternalFast => match &self.fast {
                Some(client) => {
                    self.external_attempt(client, self.config.fast_timeout, request, layer)
                        .await
                }
                None => return LayerAttempt::NotConfigured,
            },
            CascadeLayer::ExternalLlm => match &self.llm {
                Some(client) => {
                    self.external_attempt(client, self.config.llm_timeout, request, layer)
                        .await
                }
                None => return LayerAttempt::NotConfigured,
            },
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        let Some(output) = output else {
            self.metrics.record_attempt(layer, latency_ms, None);
            return LayerAttempt::Unavailable;
        };

        let calibration = self.calibrator.calibrate(&output.scores, &self.catalog);
        self.metrics
            .record_attempt(layer, latency_ms, Some(calibration.confidence));

        let result = self.build_result(layer, &output, &calibration);
        if result.requires_human_review {
            LayerAttempt::NeedsEscalation(result)
        } else {
            LayerAttempt::Confident(result)
        }
    }

    /// Call an external backend with a deadline. Timeouts, transport errors,
    /// and score vectors that do not line up with the catalog all collapse
    /// to None: the cascade treats them as a low-confidence miss.
    async fn external_attempt(
        &self,
        client: &ModelClient,
        timeout: Duration,
        request: &ClassificationRequest,
        layer: CascadeLayer,
    ) -> Option<LayerOutput> {
        let score_request = ScoreRequest {
            normalized_text: normalize(&request.description),
            amount: request.amount,
            user_id: request.user_id.clone(),
        };

        let response = match tokio::time::timeout(timeout, client.score(&score_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(layer = %layer, host = client.host(), error = %e, "external layer failed");
                return None;
            }
            Err(_) => {
                warn!(layer = %layer, host = client.host(), ?timeout, "external layer timed out");
                return None;
            }
        };

        if response.raw_score_vector.len() != self.catalog.len() {
            warn!(
                layer = %layer,
                got = response.raw_score_vector.len(),
                expected = self.catalog.len(),
                "external layer returned a malformed score vector"
            );
            return None;
        }

        let scores = response.raw_score_vector;
        let probabilities = crate::calibrate::softmax(&scores, 1.0);
        let (best_index, confidence) = crate::keyword::argmax(&probabilities);
        let alternatives = crate::calibrate::top_candidates(&probabilities, &self.catalog, 3);

        Some(LayerOutput {
            scores,
            best_index,
            confidence,
            alternatives,
            explanation: format!("External model prediction ({})", client.model()),
        })
    }

    fn build_result(
        &self,
        layer: CascadeLayer,
        output: &LayerOutput,
        calibration: &Calibration,
    ) -> ClassificationResult {
        let best = calibration.top.first().cloned().unwrap_or_else(|| {
            let other = self.catalog.other();
            ScoredCategory {
                category_id: other.id,
                name: other.name.clone(),
                score: 0.0,
            }
        });

        let mut confidence = calibration.confidence;
        if layer == CascadeLayer::Fuzzy {
            confidence = confidence.min(self.fuzzy.confidence_ceiling());
        }

        // confident answers carry the layer's own story (matched keywords);
        // review cases explain what made the calibrator hesitate
        let explanation = if calibration.requires_human_review {
            self.calibrator.explain(calibration)
        } else {
            output.explanation.clone()
        };

        ClassificationResult {
            category_id: best.category_id,
            category_name: best.name,
            confidence,
            alternatives: calibration.top.clone(),
            layer,
            explanation,
            requires_human_review: calibration.requires_human_review,
        }
    }

    /// Per-user adjustments from the feedback learner: dampen confidence on
    /// categories this user keeps correcting, and override the pick when the
    /// correction pattern is strong.
    fn apply_feedback(&self, result: &mut ClassificationResult, request: &ClassificationRequest) {
        let (Some(learner), Some(user_id)) = (&self.learner, &request.user_id) else {
            return;
        };

        let predicted = result.category_id;

        if let Some(target) = learner.suggested_category(user_id, predicted) {
            if target != predicted {
                if let Some(category) = self.catalog.get(target) {
                    info!(
                        user = %user_id,
                        from = predicted,
                        to = target,
                        "overriding prediction from user correction history"
                    );
                    result.category_id = category.id;
                    result.category_name = category.name.clone();
                    result.explanation = format!(
                        "{} (overridden by this user's correction history)",
                        result.explanation
                    );
                }
            }
        }

        let adjustment = learner.confidence_adjustment(user_id, predicted);
        if adjustment < 1.0 {
            result.confidence *= adjustment;
            if result.confidence < self.calibrator.config().confidence_floor {
                result.requires_human_review = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::store::MemoryStore;

    fn cascade() -> ClassificationCascade {
        ClassificationCascade::new(Arc::new(CategoryCatalog::vietnamese_defaults()))
    }

    #[tokio::test]
    async fn test_keyword_layer_handles_clear_descriptions() {
        let c = cascade();
        let result = c
            .classify(&ClassificationRequest::new("starbucks cafe sáng 45000").with_amount(45_000.0))
            .await
            .unwrap();

        assert_eq!(result.layer, CascadeLayer::Keywords);
        assert_eq!(result.category_name, "Ăn uống");
        assert!(!result.requires_human_review);
        assert!(result.confidence >= 0.6);
        assert_eq!(result.alternatives.len(), 3);
    }

    #[tokio::test]
    async fn test_typo_escalates_to_fuzzy() {
        let c = cascade();
        let result = c
            .classify(&ClassificationRequest::new("caphe szang"))
            .await
            .unwrap();

        assert_eq!(result.layer, CascadeLayer::Fuzzy);
        assert_eq!(result.category_name, "Ăn uống");
        assert!(!result.requires_human_review);
    }

    #[tokio::test]
    async fn test_exhausted_cascade_flags_review_instead_of_failing() {
        let c = cascade();
        let result = c
            .classify(&ClassificationRequest::new("zzzz qqqq"))
            .await
            .unwrap();

        assert!(result.requires_human_review);
        // externals are not configured, so the last produced result is fuzzy
        assert_eq!(result.layer, CascadeLayer::Fuzzy);
        assert_eq!(result.category_name, "Khác");
    }

    #[tokio::test]
    async fn test_confident_external_fast_wins() {
        let catalog = Arc::new(CategoryCatalog::vietnamese_defaults());
        let mut scores = vec![0.0; catalog.len()];
        scores[6] = 8.0; // Sức khỏe
        let c = ClassificationCascade::new(catalog)
            .with_fast(ModelClient::Mock(MockBackend::new(7, scores)));

        let result = c
            .classify(&ClassificationRequest::new("zzzz qqqq"))
            .await
            .unwrap();

        assert_eq!(result.layer, CascadeLayer::ExternalFast);
        assert_eq!(result.category_name, "Sức khỏe");
        assert!(!result.requires_human_review);
    }

    #[tokio::test]
    async fn test_failing_external_advances_to_llm() {
        let catalog = Arc::new(CategoryCatalog::vietnamese_defaults());
        let mut scores = vec![0.0; catalog.len()];
        scores[1] = 8.0; // Di chuyển
        let c = ClassificationCascade::new(catalog)
            .with_fast(ModelClient::Mock(MockBackend::failing()))
            .with_llm(ModelClient::Mock(MockBackend::new(2, scores)));

        let result = c
            .classify(&ClassificationRequest::new("zzzz qqqq"))
            .await
            .unwrap();

        assert_eq!(result.layer, CascadeLayer::ExternalLlm);
        assert_eq!(result.category_name, "Di chuyển");
    }

    #[tokio::test]
    async fn test_malformed_score_vector_is_unavailable() {
        let catalog = Arc::new(CategoryCatalog::vietnamese_defaults());
        let c = ClassificationCascade::new(catalog)
            .with_fast(ModelClient::Mock(MockBackend::new(1, vec![1.0, 2.0])));

        let result = c
            .classify(&ClassificationRequest::new("zzzz qqqq"))
            .await
            .unwrap();

        // the two-score vector does not line up with the catalog, so the
        // fast layer is treated as unavailable and the fuzzy fallback wins
        assert_eq!(result.layer, CascadeLayer::Fuzzy);
        assert!(result.requires_human_review);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let c = cascade();
        let result = c.classify(&ClassificationRequest::new("   ")).await;
        assert!(matches!(result, Err(Error::InvalidData(_))));

        // an amount alone is enough to enter the cascade
        let result = c
            .classify(&ClassificationRequest::new("").with_amount(45_000.0))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_see_every_attempt() {
        let c = cascade();
        c.classify(&ClassificationRequest::new("zzzz qqqq"))
            .await
            .unwrap();

        let snap = c.metrics().snapshot();
        assert_eq!(snap.layers[CascadeLayer::Keywords.index()].invocations, 1);
        assert_eq!(snap.layers[CascadeLayer::Fuzzy.index()].invocations, 1);
        // unconfigured layers are skipped, not counted
        assert_eq!(snap.layers[CascadeLayer::ExternalFast.index()].invocations, 0);
    }

    #[tokio::test]
    async fn test_strong_user_pattern_overrides_prediction() {
        let metrics = Arc::new(MetricsRecorder::new());
        let learner = Arc::new(FeedbackLearner::new(metrics.clone()));
        let store = MemoryStore::new();

        // five corrections food -> shopping for this user
        for i in 0..5 {
            learner
                .record_correction(
                    &store,
                    "u1",
                    &format!("don hang so {}", i),
                    1,
                    3,
                    CascadeLayer::Keywords,
                )
                .unwrap();
        }

        let c = ClassificationCascade::new(Arc::new(CategoryCatalog::vietnamese_defaults()))
            .with_metrics(metrics)
            .with_learner(learner);

        let result = c
            .classify(
                &ClassificationRequest::new("starbucks cafe sáng")
                    .with_amount(45_000.0)
                    .with_user("u1"),
            )
            .await
            .unwrap();

        assert_eq!(result.category_name, "Mua sắm");
        assert!(result.explanation.contains("correction history"));
        // the pattern also dampens confidence by 20%
        assert!(result.confidence < 0.9);
    }

    #[tokio::test]
    async fn test_weak_user_pattern_only_dampens_confidence() {
        let metrics = Arc::new(MetricsRecorder::new());
        let learner = Arc::new(FeedbackLearner::new(metrics.clone()));
        let store = MemoryStore::new();

        for i in 0..3 {
            learner
                .record_correction(
                    &store,
                    "u1",
                    &format!("don hang so {}", i),
                    1,
                    3,
                    CascadeLayer::Keywords,
                )
                .unwrap();
        }

        let c = ClassificationCascade::new(Arc::new(CategoryCatalog::vietnamese_defaults()))
            .with_metrics(metrics)
            .with_learner(learner);

        let result = c
            .classify(
                &ClassificationRequest::new("starbucks cafe sáng")
                    .with_amount(45_000.0)
                    .with_user("u1"),
            )
            .await
            .unwrap();

        // three corrections dampen but do not override
        assert_eq!(result.category_name, "Ăn uống");
        let baseline = c
            .classify(&ClassificationRequest::new("starbucks cafe sáng").with_amount(45_000.0))
            .await
            .unwrap();
        assert!(result.confidence < baseline.confidence);
    }
}
