//! Category catalog
//!
//! The catalog is built once at startup and passed by reference to every
//! classifier; nothing in this crate mutates it after construction. The only
//! way a new category appears is the surrounding application approving a
//! [`crate::models::CategorySuggestion`] and rebuilding the catalog.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{AmountRange, Category, CategoryKind};

/// Read-only category registry with stable iteration order.
///
/// Score vectors throughout the crate are indexed in this catalog's order.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
    by_id: HashMap<i64, usize>,
    other_index: usize,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: Vec<Category>,
    other_id: i64,
}

impl CategoryCatalog {
    /// Build a catalog from explicit rows.
    ///
    /// Malformed rows (empty name, duplicate id, or a non-fallback category
    /// with no keywords) are skipped with a warning rather than failing the
    /// whole catalog. `other_id` must survive the filtering: the cascade
    /// needs a miscellaneous bucket to fall back to.
    pub fn new(categories: Vec<Category>, other_id: i64) -> Result<Self> {
        let mut kept: Vec<Category> = Vec::with_capacity(categories.len());
        let mut by_id: HashMap<i64, usize> = HashMap::new();

        for category in categories {
            if category.name.trim().is_empty() {
                warn!(id = category.id, "skipping category with empty name");
                continue;
            }
            if category.keywords.is_empty() && category.id != other_id {
                warn!(
                    id = category.id,
                    name = %category.name,
                    "skipping category with no keywords"
                );
                continue;
            }
            if by_id.contains_key(&category.id) {
                warn!(id = category.id, name = %category.name, "skipping duplicate category id");
                continue;
            }
            by_id.insert(category.id, kept.len());
            kept.push(category);
        }

        let other_index = *by_id
            .get(&other_id)
            .ok_or_else(|| Error::Catalog(format!("fallback category {} not in catalog", other_id)))?;

        Ok(Self {
            categories: kept,
            by_id,
            other_index,
        })
    }

    /// Load a catalog from a JSON document: `{"categories": [...], "other_id": N}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.categories, file.other_id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.by_id.get(&id).map(|&i| &self.categories[i])
    }

    pub fn by_index(&self, index: usize) -> &Category {
        &self.categories[index]
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// The miscellaneous fallback bucket.
    pub fn other(&self) -> &Category {
        &self.categories[self.other_index]
    }

    pub fn other_index(&self) -> usize {
        self.other_index
    }

    /// Built-in Vietnamese catalog with VND amount ranges.
    ///
    /// Keyword lists mix category words, common merchants, and the
    /// accent-stripped forms users actually type.
    pub fn vietnamese_defaults() -> Self {
        let categories = vec![
            category(
                1,
                "Ăn uống",
                CategoryKind::Expense,
                "🍜",
                &[
                    "an uong", "ca phe", "cafe", "coffee", "tra sua", "an sang", "an trua",
                    "an toi", "an vat", "com", "pho", "bun", "banh mi", "nha hang", "quan an",
                    "do an", "nuoc uong", "starbucks", "highlands", "phuc long", "kfc",
                    "lotteria", "grabfood", "shopeefood",
                ],
                Some((10_000.0, 2_000_000.0)),
                1.2,
            ),
            category(
                2,
                "Di chuyển",
                CategoryKind::Expense,
                "🛵",
                &[
                    "di chuyen", "grab", "be", "gojek", "taxi", "xe om", "xang", "do xang",
                    "gui xe", "ve xe", "xe bus", "xe buyt", "tau", "ve tau", "mai linh",
                    "vinasun", "rua xe",
                ],
                Some((5_000.0, 1_000_000.0)),
                1.1,
            ),
            category(
                3,
                "Mua sắm",
                CategoryKind::Expense,
                "🛍️",
                &[
                    "mua sam", "shopee", "lazada", "tiki", "sendo", "quan ao", "giay dep",
                    "my pham", "dien may", "the gioi di dong", "fpt shop", "sieu thi",
                    "bach hoa xanh", "winmart", "coopmart",
                ],
                Some((20_000.0, 10_000_000.0)),
                1.0,
            ),
            category(
                4,
                "Hóa đơn & Tiện ích",
                CategoryKind::Expense,
                "🧾",
                &[
                    "hoa don", "tien dien", "tien nuoc", "tien net", "internet", "wifi",
                    "dien thoai", "nap the", "vnpt", "viettel", "mobifone", "vinaphone",
                    "truyen hinh",
                ],
                Some((50_000.0, 5_000_000.0)),
                1.1,
            ),
            category(
                5,
                "Nhà ở",
                CategoryKind::Expense,
                "🏠",
                &[
                    "tien nha", "tien phong", "thue nha", "phong tro", "chung cu",
                    "phi quan ly", "tien coc",
                ],
                Some((500_000.0, 20_000_000.0)),
                1.0,
            ),
            category(
                6,
                "Giải trí",
                CategoryKind::Expense,
                "🎮",
                &[
                    "giai tri", "xem phim", "cgv", "lotte cinema", "galaxy", "karaoke",
                    "game", "nap game", "netflix", "spotify", "youtube", "bia", "nhau",
                ],
                Some((30_000.0, 3_000_000.0)),
                1.0,
            ),
            category(
                7,
                "Sức khỏe",
                CategoryKind::Expense,
                "💊",
                &[
                    "suc khoe", "thuoc", "nha thuoc", "pharmacity", "long chau",
                    "benh vien", "phong kham", "kham benh", "bac si", "vitamin",
                    "xet nghiem", "nha khoa",
                ],
                Some((20_000.0, 5_000_000.0)),
                1.0,
            ),
            category(
                8,
                "Giáo dục",
                CategoryKind::Expense,
                "📚",
                &[
                    "giao duc", "hoc phi", "khoa hoc", "sach", "tieng anh", "ielts",
                    "trung tam", "hoc them", "van phong pham",
                ],
                Some((50_000.0, 20_000_000.0)),
                0.9,
            ),
            category(
                9,
                "Du lịch",
                CategoryKind::Expense,
                "✈️",
                &[
                    "du lich", "ve may bay", "vietjet", "bamboo", "vietnam airlines",
                    "khach san", "homestay", "resort", "tour", "booking", "agoda",
                ],
                Some((200_000.0, 30_000_000.0)),
                0.9,
            ),
            category(
                10,
                "Lương",
                CategoryKind::Income,
                "💰",
                &["luong", "tien luong", "salary", "tra luong"],
                Some((3_000_000.0, 100_000_000.0)),
                1.2,
            ),
            category(11, "Khác", CategoryKind::Expense, "📦", &[], None, 1.0),
        ];

        // the built-in rows are well-formed, so new() cannot fail here
        Self::new(categories, 11).expect("default catalog is well-formed")
    }
}

fn category(
    id: i64,
    name: &str,
    kind: CategoryKind,
    icon: &str,
    keywords: &[&str],
    range: Option<(f64, f64)>,
    weight: f64,
) -> Category {
    Category {
        id,
        name: name.to_string(),
        kind,
        icon: icon.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        typical_range: range.map(|(low, high)| AmountRange::new(low, high)),
        weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_well_formed() {
        let catalog = CategoryCatalog::vietnamese_defaults();
        assert_eq!(catalog.len(), 11);
        assert_eq!(catalog.other().name, "Khác");
        assert_eq!(catalog.index_of(1), Some(0));
        assert!(catalog.iter().any(|c| c.kind == CategoryKind::Income));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let rows = vec![
            category(1, "Ăn uống", CategoryKind::Expense, "🍜", &["com"], None, 1.0),
            category(2, "", CategoryKind::Expense, "?", &["x"], None, 1.0),
            category(3, "No keywords", CategoryKind::Expense, "?", &[], None, 1.0),
            category(1, "Duplicate id", CategoryKind::Expense, "?", &["y"], None, 1.0),
            category(9, "Khác", CategoryKind::Expense, "📦", &[], None, 1.0),
        ];
        let catalog = CategoryCatalog::new(rows, 9).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.other().id, 9);
    }

    #[test]
    fn test_missing_fallback_is_an_error() {
        let rows = vec![category(
            1,
            "Ăn uống",
            CategoryKind::Expense,
            "🍜",
            &["com"],
            None,
            1.0,
        )];
        assert!(CategoryCatalog::new(rows, 99).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "categories": [
                {"id": 1, "name": "Ăn uống", "kind": "expense", "icon": "🍜",
                 "keywords": ["com", "pho"],
                 "typical_range": {"low": 10000.0, "high": 2000000.0}},
                {"id": 2, "name": "Khác", "kind": "expense", "icon": "📦", "keywords": []}
            ],
            "other_id": 2
        }"#;
        let catalog = CategoryCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap().weight, 1.0);
        assert!(catalog.get(1).unwrap().typical_range.unwrap().contains(45_000.0));
    }
}
