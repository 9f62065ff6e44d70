//! Confidence calibration
//!
//! Raw layer scores are not probabilities: a keyword layer that matched two
//! keywords is not "5.8 confident". The calibrator rescales a layer's raw
//! score vector with temperature scaling, derives a calibrated probability
//! distribution, and decides whether the answer is safe to auto-accept or
//! needs a human.
//!
//! Entropy is computed over the surfaced top-K probabilities (without
//! renormalization), not the full catalog distribution. The review gate
//! should reflect the uncertainty a reviewer actually sees in the surfaced
//! alternatives; full-catalog entropy is dominated by the long tail of
//! near-zero categories, which would make the threshold useless for
//! catalogs of ten-plus categories. The thresholds below were chosen
//! against the top-K definition.

use serde::{Deserialize, Serialize};

use crate::catalog::CategoryCatalog;
use crate::models::ScoredCategory;

/// Tunable calibration thresholds
#[derive(Debug, Clone)]
pub struct CalibratorConfig {
    /// Softmax temperature; larger is more conservative
    pub temperature: f64,
    /// Minimum calibrated confidence to skip review
    pub confidence_floor: f64,
    /// Minimum top-1/top-2 probability gap to skip review
    pub margin_floor: f64,
    /// Maximum Shannon entropy (bits) over the surfaced candidates
    pub entropy_ceiling: f64,
    /// How many candidates to surface
    pub top_k: usize,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            temperature: 1.5,
            confidence_floor: 0.60,
            margin_floor: 0.20,
            entropy_ceiling: 1.5,
            top_k: 3,
        }
    }
}

/// Calibrated view of one layer's score vector
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Calibrated probability per catalog category, in catalog order
    pub probabilities: Vec<f64>,
    /// Top candidates by calibrated probability; leading entry is the winner
    pub top: Vec<ScoredCategory>,
    /// Calibrated probability of the winner
    pub confidence: f64,
    /// Gap between the top two calibrated probabilities
    pub margin: f64,
    /// Shannon entropy (bits) over `top`
    pub entropy_bits: f64,
    pub requires_human_review: bool,
}

/// A labeled score vector for offline temperature tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub scores: Vec<f64>,
    pub correct_index: usize,
}

/// Rescales raw layer scores and gates automatic acceptance.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceCalibrator {
    config: CalibratorConfig,
}

impl ConfidenceCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Calibrate a raw score vector (one score per catalog category).
    pub fn calibrate(&self, raw_scores: &[f64], catalog: &CategoryCatalog) -> Calibration {
        let probabilities = softmax(raw_scores, self.config.temperature);
        let top = top_candidates(&probabilities, catalog, self.config.top_k);

        let confidence = top.first().map(|c| c.score).unwrap_or(0.0);
        let margin = match top.len() {
            0 | 1 => confidence,
            _ => confidence - top[1].score,
        };
        let entropy_bits = entropy(top.iter().map(|c| c.score));

        let requires_human_review = confidence < self.config.confidence_floor
            || margin < self.config.margin_floor
            || entropy_bits > self.config.entropy_ceiling;

        Calibration {
            probabilities,
            top,
            confidence,
            margin,
            entropy_bits,
            requires_human_review,
        }
    }

    /// Human-readable summary of a calibration.
    ///
    /// Three shapes: a single confident category, two competing categories
    /// when review is required and a runner-up exists, or a single uncertain
    /// category.
    pub fn explain(&self, calibration: &Calibration) -> String {
        let Some(best) = calibration.top.first() else {
            return "No candidate category".to_string();
        };

        if !calibration.requires_human_review {
            return format!(
                "Classified as '{}' ({:.0}% confidence)",
                best.name,
                best.score * 100.0
            );
        }

        if let Some(second) = calibration.top.get(1) {
            return format!("Needs review: could be '{}' or '{}'", best.name, second.name);
        }

        format!("Needs review: low confidence for '{}'", best.name)
    }

    /// Grid-search a temperature minimizing Expected Calibration Error over
    /// a labeled validation set.
    ///
    /// Searches T in [0.5, 3.0] with step 0.05 using 10 confidence bins.
    /// The range and step are tuning knobs, not contracts; callers persist
    /// the returned value themselves.
    pub fn tune_temperature(samples: &[CalibrationSample]) -> f64 {
        let mut best_t = CalibratorConfig::default().temperature;
        let mut best_ece = f64::INFINITY;

        for step in 0..=50 {
            let t = 0.5 + step as f64 * 0.05;
            let ece = expected_calibration_error(samples, t);
            if ece < best_ece {
                best_ece = ece;
                best_t = t;
            }
        }
        best_t
    }
}

/// Numerically stable softmax with temperature scaling.
pub(crate) fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| ((s - max) / t).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Top-k categories by probability, in descending order.
pub(crate) fn top_candidates(
    probabilities: &[f64],
    catalog: &CategoryCatalog,
    k: usize,
) -> Vec<ScoredCategory> {
    let mut indexed: Vec<(usize, f64)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed
        .into_iter()
        .take(k)
        .map(|(i, p)| {
            let category = catalog.by_index(i);
            ScoredCategory {
                category_id: category.id,
                name: category.name.clone(),
                score: p,
            }
        })
        .collect()
}

fn entropy(probabilities: impl Iterator<Item = f64>) -> f64 {
    -probabilities
        .filter(|&p| p > 0.0)
        .map(|p| p * p.log2())
        .sum::<f64>()
}

fn expected_calibration_error(samples: &[CalibrationSample], temperature: f64) -> f64 {
    const BINS: usize = 10;

    if samples.is_empty() {
        return 0.0;
    }

    let mut bin_confidence = [0.0f64; BINS];
    let mut bin_correct = [0.0f64; BINS];
    let mut bin_count = [0usize; BINS];

    for sample in samples {
        let probs = softmax(&sample.scores, temperature);
        let (argmax, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        let bin = ((confidence * BINS as f64) as usize).min(BINS - 1);
        bin_confidence[bin] += confidence;
        bin_correct[bin] += if argmax == sample.correct_index { 1.0 } else { 0.0 };
        bin_count[bin] += 1;
    }

    let n = samples.len() as f64;
    (0..BINS)
        .filter(|&b| bin_count[b] > 0)
        .map(|b| {
            let count = bin_count[b] as f64;
            let avg_conf = bin_confidence[b] / count;
            let accuracy = bin_correct[b] / count;
            (avg_conf - accuracy).abs() * count / n
        })
        .sum()
}
