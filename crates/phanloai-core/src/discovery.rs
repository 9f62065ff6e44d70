//! Category discovery
//!
//! Mines transactions stuck in the miscellaneous bucket for recurring themes
//! worth promoting to first-class categories. Callers feed it descriptions
//! already filed under "other"; everything else is out of bounds.
//!
//! A fixed set of regex heuristics per transaction kind proposes a candidate
//! name. The candidate is dropped when an existing category of the same kind
//! is already close enough by name similarity, and repeated sightings merge
//! into the user's pending suggestion instead of piling up duplicates.

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use crate::catalog::CategoryCatalog;
use crate::error::{Error, Result};
use crate::models::{CategoryKind, CategorySuggestion, SuggestionStatus};
use crate::normalize::{normalize, similarity};
use crate::store::SuggestionStore;

/// Starting confidence for a fresh suggestion
const BASE_CONFIDENCE: f64 = 0.65;
/// Confidence growth per corroborating sample, capped at 1.0
const CONFIDENCE_STEP: f64 = 0.05;
/// Retained sample descriptions per suggestion
const MAX_SAMPLES: usize = 3;
/// Candidates at least this similar to an existing category are suppressed
const SUPPRESS_SIMILARITY: f64 = 0.80;

struct DiscoveryRule {
    name: &'static str,
    icon: &'static str,
    color: &'static str,
    pattern: Regex,
}

/// Proposes new categories from recurring "other"-bucket descriptions.
pub struct CategoryDiscovery {
    expense_rules: Vec<DiscoveryRule>,
    income_rules: Vec<DiscoveryRule>,
}

impl CategoryDiscovery {
    pub fn new() -> Result<Self> {
        let expense_rules = vec![
            rule("Thú cưng", "🐾", "#8e44ad", r"\b(thu cung|thu y|pet|meo|cun)\b")?,
            rule(
                "Làm đẹp",
                "💅",
                "#e91e63",
                r"\b(spa|nail|salon|lam dep|massage|cat toc|goi dau)\b",
            )?,
            rule(
                "Sửa chữa nhà",
                "🔧",
                "#795548",
                r"\b(sua nha|sua chua|dien nuoc|son nha|thay khoa|sua may)\b",
            )?,
            rule("Từ thiện", "🤝", "#4caf50", r"\b(tu thien|quyen gop|ung ho)\b")?,
            rule("Bảo hiểm", "🛡️", "#3f51b5", r"\bbao hiem\b")?,
            rule(
                "Dịch vụ đăng ký",
                "🔁",
                "#009688",
                r"\b(goi thang|goi cuoc|thue bao|gia han goi)\b",
            )?,
            rule(
                "Sở thích",
                "🎨",
                "#ff9800",
                r"\b(cau ca|guitar|piano|ve tranh|nhiep anh|bonsai|mo hinh)\b",
            )?,
        ];

        let income_rules = vec![
            rule("Cho thuê", "🏘️", "#607d8b", r"\b(cho thue|khach thue)\b")?,
            rule(
                "Tiền thưởng",
                "🎁",
                "#ffc107",
                r"\b(thuong|bonus|luong thang 13)\b",
            )?,
            rule(
                "Thu nhập phụ",
                "💼",
                "#00bcd4",
                r"\b(ban hang|freelance|lam them|hoa hong|don hang)\b",
            )?,
        ];

        Ok(Self {
            expense_rules,
            income_rules,
        })
    }

    /// Examine one "other"-bucket transaction description.
    ///
    /// Returns the created or updated pending suggestion, or None when no
    /// heuristic matched or an equivalent category already exists.
    pub fn observe(
        &self,
        store: &dyn SuggestionStore,
        catalog: &CategoryCatalog,
        user_id: &str,
        description: &str,
        kind: CategoryKind,
    ) -> Result<Option<CategorySuggestion>> {
        let normalized = normalize(description);
        let rules = match kind {
            CategoryKind::Expense => &self.expense_rules,
            CategoryKind::Income => &self.income_rules,
        };

        let Some(rule) = rules.iter().find(|r| r.pattern.is_match(&normalized)) else {
            return Ok(None);
        };

        // an equivalent category may already exist under a slightly
        // different spelling; do not suggest a duplicate
        let candidate_name = normalize(rule.name);
        for category in catalog.iter().filter(|c| c.kind == kind) {
            let existing = normalize(&category.name);
            if similarity(&existing, &candidate_name) >= SUPPRESS_SIMILARITY {
                debug!(
                    candidate = rule.name,
                    existing = %category.name,
                    "suppressing suggestion, equivalent category exists"
                );
                return Ok(None);
            }
        }

        let pending = store.list_by_user_status(user_id, SuggestionStatus::Pending)?;
        if let Some(mut existing) = pending.into_iter().find(|s| s.name == rule.name) {
            if existing.samples.len() < MAX_SAMPLES {
                existing.samples.push(normalized);
            }
            existing.transaction_count += 1;
            existing.confidence = (existing.confidence + CONFIDENCE_STEP).min(1.0);
            store.update(&existing)?;
            debug!(
                user = user_id,
                name = %existing.name,
                count = existing.transaction_count,
                confidence = existing.confidence,
                "merged sample into pending suggestion"
            );
            return Ok(Some(existing));
        }

        let mut suggestion = CategorySuggestion {
            id: 0,
            user_id: user_id.to_string(),
            name: rule.name.to_string(),
            kind,
            icon: rule.icon.to_string(),
            color: rule.color.to_string(),
            confidence: BASE_CONFIDENCE,
            samples: vec![normalized],
            transaction_count: 1,
            status: SuggestionStatus::Pending,
            rejected_reason: None,
            merged_into: None,
            created_at: Utc::now(),
        };
        suggestion.id = store.insert(&suggestion)?;
        info!(user = user_id, name = %suggestion.name, "new category suggestion");
        Ok(Some(suggestion))
    }

    /// Accept a pending suggestion. The caller materializes the new catalog
    /// row; this only advances the lifecycle.
    pub fn approve(&self, store: &dyn SuggestionStore, id: i64) -> Result<CategorySuggestion> {
        let mut suggestion = store.get(id)?;
        ensure_pending(&suggestion)?;
        suggestion.status = SuggestionStatus::Approved;
        store.update(&suggestion)?;
        info!(id, name = %suggestion.name, "suggestion approved");
        Ok(suggestion)
    }

    /// Reject a pending suggestion with a reason.
    pub fn reject(
        &self,
        store: &dyn SuggestionStore,
        id: i64,
        reason: &str,
    ) -> Result<CategorySuggestion> {
        let mut suggestion = store.get(id)?;
        ensure_pending(&suggestion)?;
        suggestion.status = SuggestionStatus::Rejected;
        suggestion.rejected_reason = Some(reason.to_string());
        store.update(&suggestion)?;
        info!(id, name = %suggestion.name, reason, "suggestion rejected");
        Ok(suggestion)
    }

    /// Fold a pending suggestion into an existing catalog category.
    pub fn merge_into(
        &self,
        store: &dyn SuggestionStore,
        catalog: &CategoryCatalog,
        id: i64,
        category_id: i64,
    ) -> Result<CategorySuggestion> {
        if catalog.get(category_id).is_none() {
            return Err(Error::NotFound(format!("category {}", category_id)));
        }
        let mut suggestion = store.get(id)?;
        ensure_pending(&suggestion)?;
        suggestion.status = SuggestionStatus::Merged;
        suggestion.merged_into = Some(category_id);
        store.update(&suggestion)?;
        info!(id, name = %suggestion.name, category_id, "suggestion merged");
        Ok(suggestion)
    }
}

fn rule(
    name: &'static str,
    icon: &'static str,
    color: &'static str,
    pattern: &str,
) -> Result<DiscoveryRule> {
    Ok(DiscoveryRule {
        name,
        icon,
        color,
        pattern: Regex::new(pattern)?,
    })
}

fn ensure_pending(suggestion: &CategorySuggestion) -> Result<()> {
    if suggestion.status != SuggestionStatus::Pending {
        return Err(Error::InvalidData(format!(
            "suggestion {} is already {}",
            suggestion.id, suggestion.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountRange, Category};
    use crate::store::MemoryStore;

    fn setup() -> (CategoryDiscovery, MemoryStore, CategoryCatalog) {
        (
            CategoryDiscovery::new().unwrap(),
            MemoryStore::new(),
            CategoryCatalog::vietnamese_defaults(),
        )
    }

    #[test]
    fn test_three_sightings_merge_into_one_pending_suggestion() {
        let (discovery, store, catalog) = setup();
        let descriptions = [
            "mua hạt cho mèo",
            "khám thú y cho cún",
            "đồ chơi cho thú cưng",
        ];
        for d in descriptions {
            discovery
                .observe(&store, &catalog, "u1", d, CategoryKind::Expense)
                .unwrap()
                .expect("pet description should produce a suggestion");
        }

        let pending = store
            .list_by_user_status("u1", SuggestionStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        let s = &pending[0];
        assert_eq!(s.name, "Thú cưng");
        assert_eq!(s.transaction_count, 3);
        assert!((s.confidence - 0.75).abs() < 1e-9);
        assert_eq!(s.samples.len(), 3);
    }

    #[test]
    fn test_samples_cap_and_confidence_cap() {
        let (discovery, store, catalog) = setup();
        for i in 0..10 {
            discovery
                .observe(
                    &store,
                    &catalog,
                    "u1",
                    &format!("spa lan {}", i),
                    CategoryKind::Expense,
                )
                .unwrap();
        }
        let pending = store
            .list_by_user_status("u1", SuggestionStatus::Pending)
            .unwrap();
        let s = &pending[0];
        assert_eq!(s.transaction_count, 10);
        assert_eq!(s.samples.len(), MAX_SAMPLES);
        assert!(s.confidence <= 1.0);
    }

    #[test]
    fn test_no_heuristic_no_suggestion() {
        let (discovery, store, catalog) = setup();
        let out = discovery
            .observe(&store, &catalog, "u1", "chuyen khoan linh tinh", CategoryKind::Expense)
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_existing_similar_category_suppresses() {
        let (discovery, store, _) = setup();
        // a catalog that already has a pet category, spelled without accents
        let catalog = CategoryCatalog::new(
            vec![
                Category {
                    id: 1,
                    name: "Thu cung".to_string(),
                    kind: CategoryKind::Expense,
                    icon: "🐾".to_string(),
                    keywords: vec!["thu cung".to_string()],
                    typical_range: Some(AmountRange::new(10_000.0, 2_000_000.0)),
                    weight: 1.0,
                },
                Category {
                    id: 2,
                    name: "Khác".to_string(),
                    kind: CategoryKind::Expense,
                    icon: "📦".to_string(),
                    keywords: vec![],
                    typical_range: None,
                    weight: 1.0,
                },
            ],
            2,
        )
        .unwrap();

        let out = discovery
            .observe(&store, &catalog, "u1", "mua hat cho meo", CategoryKind::Expense)
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_income_heuristics_are_separate() {
        let (discovery, store, catalog) = setup();
        let out = discovery
            .observe(
                &store,
                &catalog,
                "u1",
                "nhan tien cho thue phong thang 7",
                CategoryKind::Income,
            )
            .unwrap()
            .unwrap();
        assert_eq!(out.name, "Cho thuê");
        assert_eq!(out.kind, CategoryKind::Income);

        // the same text as an expense matches no expense heuristic
        let out = discovery
            .observe(
                &store,
                &catalog,
                "u2",
                "nhan tien cho thue phong thang 7",
                CategoryKind::Expense,
            )
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_lifecycle_is_terminal() {
        let (discovery, store, catalog) = setup();
        let s = discovery
            .observe(&store, &catalog, "u1", "ung ho quyen gop lu lut", CategoryKind::Expense)
            .unwrap()
            .unwrap();

        let approved = discovery.approve(&store, s.id).unwrap();
        assert_eq!(approved.status, SuggestionStatus::Approved);
        assert!(discovery.approve(&store, s.id).is_err());
        assert!(discovery.reject(&store, s.id, "duplicate").is_err());
    }

    #[test]
    fn test_reject_records_reason_and_merge_links_category() {
        let (discovery, store, catalog) = setup();
        let a = discovery
            .observe(&store, &catalog, "u1", "di spa cuoi tuan", CategoryKind::Expense)
            .unwrap()
            .unwrap();
        let rejected = discovery.reject(&store, a.id, "not recurring").unwrap();
        assert_eq!(rejected.rejected_reason.as_deref(), Some("not recurring"));

        let b = discovery
            .observe(&store, &catalog, "u2", "dong bao hiem xe", CategoryKind::Expense)
            .unwrap()
            .unwrap();
        let merged = discovery.merge_into(&store, &catalog, b.id, 4).unwrap();
        assert_eq!(merged.status, SuggestionStatus::Merged);
        assert_eq!(merged.merged_into, Some(4));

        assert!(discovery.merge_into(&store, &catalog, b.id, 4).is_err());
        // unknown target category is rejected up front
        let c = discovery
            .observe(&store, &catalog, "u3", "massage thu gian", CategoryKind::Expense)
            .unwrap()
            .unwrap();
        assert!(discovery.merge_into(&store, &catalog, c.id, 999).is_err());
    }
}
