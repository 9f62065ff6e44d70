//! Persistence boundary
//!
//! The core does not own a database. Correction events and category
//! suggestions are handed to the surrounding application through these
//! traits; [`MemoryStore`] is the in-process implementation used by tests
//! and by embedders that do not need durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{CategorySuggestion, CorrectionEvent, SuggestionStatus};

/// Append-only sink for correction events.
pub trait CorrectionStore: Send + Sync {
    fn append(&self, event: &CorrectionEvent) -> Result<()>;

    /// Most recent events, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<CorrectionEvent>>;
}

/// CRUD surface for category suggestions.
pub trait SuggestionStore: Send + Sync {
    /// Insert a new suggestion and return its assigned id.
    fn insert(&self, suggestion: &CategorySuggestion) -> Result<i64>;

    fn update(&self, suggestion: &CategorySuggestion) -> Result<()>;

    fn get(&self, id: i64) -> Result<CategorySuggestion>;

    fn list_by_user_status(
        &self,
        user_id: &str,
        status: SuggestionStatus,
    ) -> Result<Vec<CategorySuggestion>>;
}

/// In-memory store backing both traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    corrections: Mutex<Vec<CorrectionEvent>>,
    suggestions: Mutex<HashMap<i64, CategorySuggestion>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            corrections: Mutex::new(Vec::new()),
            suggestions: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl CorrectionStore for MemoryStore {
    fn append(&self, event: &CorrectionEvent) -> Result<()> {
        self.corrections.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<CorrectionEvent>> {
        let corrections = self.corrections.lock().unwrap();
        Ok(corrections.iter().rev().take(limit).cloned().collect())
    }
}

impl SuggestionStore for MemoryStore {
    fn insert(&self, suggestion: &CategorySuggestion) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = suggestion.clone();
        stored.id = id;
        self.suggestions.lock().unwrap().insert(id, stored);
        Ok(id)
    }

    fn update(&self, suggestion: &CategorySuggestion) -> Result<()> {
        let mut suggestions = self.suggestions.lock().unwrap();
        if !suggestions.contains_key(&suggestion.id) {
            return Err(Error::NotFound(format!("suggestion {}", suggestion.id)));
        }
        suggestions.insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    fn get(&self, id: i64) -> Result<CategorySuggestion> {
        self.suggestions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("suggestion {}", id)))
    }

    fn list_by_user_status(
        &self,
        user_id: &str,
        status: SuggestionStatus,
    ) -> Result<Vec<CategorySuggestion>> {
        let suggestions = self.suggestions.lock().unwrap();
        let mut found: Vec<CategorySuggestion> = suggestions
            .values()
            .filter(|s| s.user_id == user_id && s.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.id);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CascadeLayer, CategoryKind};
    use chrono::Utc;

    fn suggestion(user: &str) -> CategorySuggestion {
        CategorySuggestion {
            id: 0,
            user_id: user.to_string(),
            name: "Thú cưng".to_string(),
            kind: CategoryKind::Expense,
            icon: "🐾".to_string(),
            color: "#8e44ad".to_string(),
            confidence: 0.65,
            samples: vec!["mua hat cho meo".to_string()],
            transaction_count: 1,
            status: SuggestionStatus::Pending,
            rejected_reason: None,
            merged_into: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_suggestion_insert_and_get() {
        let store = MemoryStore::new();
        let id = store.insert(&suggestion("u1")).unwrap();
        assert!(id > 0);
        let loaded = store.get(id).unwrap();
        assert_eq!(loaded.name, "Thú cưng");
        assert_eq!(loaded.id, id);
    }

    #[test]
    fn test_list_filters_by_user_and_status() {
        let store = MemoryStore::new();
        store.insert(&suggestion("u1")).unwrap();
        store.insert(&suggestion("u2")).unwrap();

        let mut approved = suggestion("u1");
        approved.status = SuggestionStatus::Approved;
        store.insert(&approved).unwrap();

        let pending = store
            .list_by_user_status("u1", SuggestionStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, "u1");
    }

    #[test]
    fn test_update_missing_suggestion_is_not_found() {
        let store = MemoryStore::new();
        let mut s = suggestion("u1");
        s.id = 42;
        assert!(matches!(store.update(&s), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_corrections_are_append_only_and_recent_first() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .append(&CorrectionEvent {
                    user_id: "u1".to_string(),
                    description: format!("desc {}", i),
                    predicted_category: 1,
                    corrected_category: 2,
                    layer: CascadeLayer::Keywords,
                    occurred_at: Utc::now(),
                })
                .unwrap();
        }
        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].description, "desc 2");
    }
}
