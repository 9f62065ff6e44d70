//! Domain models for phanloai

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a category books money going out or coming in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Expense,
    Income,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl std::str::FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            _ => Err(format!("Unknown category kind: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typical amount bounds for a category, in VND
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AmountRange {
    pub low: f64,
    pub high: f64,
}

impl AmountRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, amount: f64) -> bool {
        amount >= self.low && amount <= self.high
    }
}

/// A spending category from the immutable catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    pub icon: String,
    /// Keywords in priority order; matching respects this order for ties
    pub keywords: Vec<String>,
    /// Typical transaction amount bounds, used as a plausibility signal
    #[serde(default)]
    pub typical_range: Option<AmountRange>,
    /// Prior weight multiplied into the raw keyword score
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// One classification request; created per call, never stored
#[derive(Debug, Clone, Default)]
pub struct ClassificationRequest {
    pub description: String,
    pub amount: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

impl ClassificationRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A cascade layer, in fixed cost order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeLayer {
    /// Literal keyword scoring against the catalog
    Keywords,
    /// Similarity-based re-match tolerating typos and teencode
    Fuzzy,
    /// Fast specialized out-of-process classifier
    ExternalFast,
    /// General LLM fallback
    ExternalLlm,
}

impl CascadeLayer {
    /// All layers, cheapest first. The cascade never moves backwards.
    pub const ALL: [CascadeLayer; 4] = [
        CascadeLayer::Keywords,
        CascadeLayer::Fuzzy,
        CascadeLayer::ExternalFast,
        CascadeLayer::ExternalLlm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keywords => "keywords",
            Self::Fuzzy => "fuzzy",
            Self::ExternalFast => "external_fast",
            Self::ExternalLlm => "external_llm",
        }
    }

    /// Position in the cost order; also the metrics array index.
    pub fn index(&self) -> usize {
        match self {
            Self::Keywords => 0,
            Self::Fuzzy => 1,
            Self::ExternalFast => 2,
            Self::ExternalLlm => 3,
        }
    }
}

impl std::str::FromStr for CascadeLayer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keywords" | "keyword" => Ok(Self::Keywords),
            "fuzzy" => Ok(Self::Fuzzy),
            "external_fast" => Ok(Self::ExternalFast),
            "external_llm" => Ok(Self::ExternalLlm),
            _ => Err(format!("Unknown cascade layer: {}", s)),
        }
    }
}

impl std::fmt::Display for CascadeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A category with a calibrated probability, as surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCategory {
    pub category_id: i64,
    pub name: String,
    pub score: f64,
}

/// The final answer for one request
///
/// `alternatives` holds the surfaced top candidates in probability order;
/// the leading entry is the chosen category itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category_id: i64,
    pub category_name: String,
    /// Calibrated confidence in [0, 1]
    pub confidence: f64,
    pub alternatives: Vec<ScoredCategory>,
    pub layer: CascadeLayer,
    pub explanation: String,
    pub requires_human_review: bool,
}

/// Raw output of a single cascade layer, before calibration
#[derive(Debug, Clone)]
pub struct LayerOutput {
    /// One raw score per catalog category, in catalog order
    pub scores: Vec<f64>,
    /// Index of the layer's own best category
    pub best_index: usize,
    /// The layer's own (uncalibrated) confidence
    pub confidence: f64,
    pub alternatives: Vec<ScoredCategory>,
    pub explanation: String,
}

/// A user correcting (or confirming) a prediction. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub user_id: String,
    /// Normalized description the prediction was made for
    pub description: String,
    pub predicted_category: i64,
    pub corrected_category: i64,
    pub layer: CascadeLayer,
    pub occurred_at: DateTime<Utc>,
}

/// A learned per-user systematic correction from one category to another
///
/// At most one active pattern exists per (user, source category); a
/// correction toward a different target replaces the pattern outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPattern {
    pub user_id: String,
    pub source_category: i64,
    pub target_category: i64,
    pub occurrences: u32,
    pub last_seen: DateTime<Utc>,
}

/// Cross-user correction tally for keyword-gap discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionStats {
    pub description: String,
    pub predicted_category: i64,
    pub corrected_category: i64,
    pub count: u32,
}

/// Lifecycle of a discovered category suggestion
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    Merged,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Merged => "merged",
        }
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "merged" => Ok(Self::Merged),
            _ => Err(format!("Unknown suggestion status: {}", s)),
        }
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate category mined from the "other" bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySuggestion {
    /// Store-assigned id (0 until inserted)
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub kind: CategoryKind,
    pub icon: String,
    pub color: String,
    /// Starts at 0.65, +0.05 per corroborating sample, capped at 1.0
    pub confidence: f64,
    /// Up to three retained sample descriptions
    pub samples: Vec<String>,
    pub transaction_count: u32,
    pub status: SuggestionStatus,
    /// Set when status is Rejected
    pub rejected_reason: Option<String>,
    /// Set when status is Merged
    pub merged_into: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Request sent to an external classifier service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    pub normalized_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Response from an external classifier service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    pub category_id: i64,
    /// One raw score per catalog category, in catalog order
    pub raw_score_vector: Vec<f64>,
    pub elapsed_ms: u64,
}
