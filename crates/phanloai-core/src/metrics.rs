//! Cascade monitoring
//!
//! In-process counters for layer usage, latency, and confidence, plus a
//! global accuracy figure fed by user feedback. Alerts are logged, never
//! thrown: an overused LLM layer or a sagging accuracy number should page a
//! human through the log pipeline, not break classification.
//!
//! Confidence samples are kept in a bounded FIFO window (cap 1,000) so the
//! recorder's memory stays constant under sustained load.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::CascadeLayer;

/// Bounded confidence window per layer, oldest evicted first
const CONFIDENCE_WINDOW_CAP: usize = 1_000;
/// Alert when the most expensive layer serves more than this share
const EXPENSIVE_SHARE_ALERT: f64 = 0.10;
/// Usage share is noise until at least this many requests were seen
const USAGE_ALERT_MIN_INVOCATIONS: u64 = 10;
/// Alert when feedback accuracy drops below this
const ACCURACY_ALERT_FLOOR: f64 = 0.80;
/// Accuracy alerting needs at least this many feedback samples
const ACCURACY_ALERT_MIN_SAMPLES: u64 = 10;

#[derive(Debug, Default)]
struct LayerStats {
    invocations: u64,
    total_latency_ms: u64,
    confidences: VecDeque<f64>,
}

#[derive(Debug, Default)]
struct Inner {
    layers: [LayerStats; 4],
    feedback_correct: u64,
    feedback_incorrect: u64,
    // alert latches; re-armed by reset()
    usage_alerted: bool,
    accuracy_alerted: bool,
}

/// Per-layer report within a [`MetricsSnapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerReport {
    pub layer: CascadeLayer,
    pub invocations: u64,
    /// Share of all invocations that hit this layer
    pub usage_share: f64,
    pub avg_latency_ms: f64,
    /// Average over the rolling confidence window; None before any sample
    pub avg_confidence: Option<f64>,
}

/// Point-in-time view of the recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub layers: Vec<LayerReport>,
    pub feedback_correct: u64,
    pub feedback_incorrect: u64,
    /// None until any feedback arrived
    pub accuracy: Option<f64>,
}

/// Thread-safe cascade metrics recorder.
///
/// All counters live behind one mutex, so `reset` and `snapshot` are atomic
/// with respect to concurrent recording.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<Inner>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one layer attempt. `confidence` is None when the layer was
    /// unavailable (timeout, connection failure): the invocation and latency
    /// still count, but no confidence sample is taken.
    pub fn record_attempt(&self, layer: CascadeLayer, latency_ms: u64, confidence: Option<f64>) {
        let mut inner = self.inner.lock().unwrap();

        let stats = &mut inner.layers[layer.index()];
        stats.invocations += 1;
        stats.total_latency_ms += latency_ms;
        if let Some(c) = confidence {
            stats.confidences.push_back(c);
            if stats.confidences.len() > CONFIDENCE_WINDOW_CAP {
                stats.confidences.pop_front();
            }
        }

        let total: u64 = inner.layers.iter().map(|l| l.invocations).sum();
        let expensive = inner.layers[CascadeLayer::ExternalLlm.index()].invocations;
        if !inner.usage_alerted && total >= USAGE_ALERT_MIN_INVOCATIONS {
            let share = expensive as f64 / total as f64;
            if share > EXPENSIVE_SHARE_ALERT {
                inner.usage_alerted = true;
                warn!(
                    share,
                    total, "LLM layer usage above threshold; cheaper layers are not keeping up"
                );
            }
        }
    }

    /// Record ground truth reported through the feedback loop.
    pub fn record_feedback(&self, correct: bool) {
        let mut inner = self.inner.lock().unwrap();
        if correct {
            inner.feedback_correct += 1;
        } else {
            inner.feedback_incorrect += 1;
        }

        let total = inner.feedback_correct + inner.feedback_incorrect;
        if !inner.accuracy_alerted && total >= ACCURACY_ALERT_MIN_SAMPLES {
            let accuracy = inner.feedback_correct as f64 / total as f64;
            if accuracy < ACCURACY_ALERT_FLOOR {
                inner.accuracy_alerted = true;
                warn!(
                    accuracy,
                    samples = total,
                    "classification accuracy below threshold"
                );
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        let total: u64 = inner.layers.iter().map(|l| l.invocations).sum();

        let layers = CascadeLayer::ALL
            .iter()
            .map(|&layer| {
                let stats = &inner.layers[layer.index()];
                LayerReport {
                    layer,
                    invocations: stats.invocations,
                    usage_share: if total > 0 {
                        stats.invocations as f64 / total as f64
                    } else {
                        0.0
                    },
                    avg_latency_ms: if stats.invocations > 0 {
                        stats.total_latency_ms as f64 / stats.invocations as f64
                    } else {
                        0.0
                    },
                    avg_confidence: if stats.confidences.is_empty() {
                        None
                    } else {
                        Some(
                            stats.confidences.iter().sum::<f64>()
                                / stats.confidences.len() as f64,
                        )
                    },
                }
            })
            .collect();

        let feedback_total = inner.feedback_correct + inner.feedback_incorrect;
        MetricsSnapshot {
            layers,
            feedback_correct: inner.feedback_correct,
            feedback_incorrect: inner.feedback_incorrect,
            accuracy: if feedback_total > 0 {
                Some(inner.feedback_correct as f64 / feedback_total as f64)
            } else {
                None
            },
        }
    }

    /// Clear all counters and re-arm the alert latches in one step.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
    }
}
