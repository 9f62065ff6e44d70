//! Phanloai Core Library
//!
//! Classifies free-text Vietnamese transaction descriptions into a fixed
//! category catalog with a calibrated confidence score:
//! - Text normalization (accents, teencode, Levenshtein similarity)
//! - Layered classification cascade: keywords → fuzzy → external service → LLM
//! - Temperature-scaled confidence calibration with a human-review gate
//! - Cascade monitoring with usage and accuracy alerts
//! - Feedback learning from user corrections (per-user patterns, keyword gaps)
//! - Category discovery over the miscellaneous bucket
//!
//! The crate is a library: persistence, transport, and UI belong to the
//! surrounding application and are reached through the traits in [`store`]
//! and the backends in [`ai`].

pub mod ai;
pub mod calibrate;
pub mod cascade;
pub mod catalog;
pub mod discovery;
pub mod error;
pub mod feedback;
pub mod fuzzy;
pub mod keyword;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod store;

/// Test utilities including the mock external classifier server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{LlmBackend, MockBackend, ModelBackend, ModelClient, RemoteBackend};
pub use calibrate::{CalibrationSample, CalibratorConfig, ConfidenceCalibrator};
pub use cascade::{CascadeConfig, ClassificationCascade};
pub use catalog::CategoryCatalog;
pub use discovery::CategoryDiscovery;
pub use error::{Error, Result};
pub use feedback::{FeedbackLearner, KeywordGap};
pub use fuzzy::{FuzzyClassifier, FuzzyConfig};
pub use keyword::KeywordClassifier;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use models::{
    CascadeLayer, Category, CategoryKind, CategorySuggestion, ClassificationRequest,
    ClassificationResult, CorrectionEvent, ScoreRequest, ScoreResponse, ScoredCategory,
    SuggestionStatus, UserPattern,
};
pub use store::{CorrectionStore, MemoryStore, SuggestionStore};
