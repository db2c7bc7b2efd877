/// Menu queries: (date, meal) → dining halls with their food items.
///
/// Storage hands back flat `menu_item` rows in display order (hall, category, item);
/// this module turns them into per-hall groupings with canonical allergens.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::allergens::{normalize_allergens, normalize_diet_tags};
use crate::error::AppError;
use crate::model::{DiningHall, MenuItem, MenuRow};

/// Read access to the `menu_item` table.
#[async_trait]
pub trait MenuStore: Send + Sync {
    /// Rows served on `date` (`YYYY-MM-DD`) for `meal`, ordered by hall name, category, item name.
    async fn menu_rows(&self, date: &str, meal: &str) -> Result<Vec<MenuRow>, AppError>;

    /// Distinct hall names, ascending.
    async fn hall_names(&self) -> Result<Vec<String>, AppError>;

    /// Distinct serving dates as `YYYY-MM-DD`, ascending.
    async fn served_dates(&self) -> Result<Vec<String>, AppError>;
}

#[derive(Clone)]
pub struct MenuService {
    store: Arc<dyn MenuStore>,
}

impl MenuService {
    pub fn new(store: Arc<dyn MenuStore>) -> Self {
        Self { store }
    }

    pub async fn get_menu(&self, date: &str, meal: &str) -> Result<Vec<DiningHall>, AppError> {
        let date = normalize_date(date)?;
        let rows = self.store.menu_rows(&date, meal).await?;
        let halls = group_rows(rows);
        debug!(date = %date, meal, halls = halls.len(), "menu loaded");
        Ok(halls)
    }

    pub async fn list_dining_halls(&self) -> Result<Vec<String>, AppError> {
        self.store.hall_names().await
    }

    pub async fn list_available_dates(&self) -> Result<Vec<String>, AppError> {
        self.store.served_dates().await
    }
}

/// Accept `MM/DD/YYYY` (month/day may be unpadded) or `YYYY-MM-DD`; return `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    let format = if raw.contains('/') { "%m/%d/%Y" } else { "%Y-%m-%d" };
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .filter(|d| d.year() >= 1000)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "invalid date {raw:?}: expected MM/DD/YYYY or YYYY-MM-DD"
            ))
        })
}

/// Group ordered rows by hall in first-seen order, dropping repeated item names per hall.
pub fn group_rows(rows: Vec<MenuRow>) -> Vec<DiningHall> {
    let mut halls: Vec<DiningHall> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: Vec<HashSet<String>> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.hall_name.clone()).or_insert_with(|| {
            halls.push(DiningHall {
                name: row.hall_name.clone(),
                food_items: Vec::new(),
            });
            seen.push(HashSet::new());
            halls.len() - 1
        });

        if !seen[slot].insert(row.item_name.to_lowercase()) {
            continue;
        }

        halls[slot].food_items.push(MenuItem {
            allergens: normalize_allergens(row.allergens.as_deref()),
            diet_flags: normalize_diet_tags(row.diet_tags.as_deref()),
            name: row.item_name,
            station: row.station,
            ingredients: row.ingredients,
            diet_tags: row.diet_tags,
            category: row.category,
            notes: row.notes,
        });
    }

    halls
}


#[cfg(test)]
mod tests {
    use super::testing::{row, DownStore, MemoryStore};
    use super::*;

    fn service(store: MemoryStore) -> MenuService {
        MenuService::new(Arc::new(store))
    }

    #[test]
    fn normalizes_both_date_forms() {
        assert_eq!(normalize_date("12/25/2024").unwrap(), "2024-12-25");
        assert_eq!(normalize_date("1/5/2025").unwrap(), "2025-01-05");
        assert_eq!(normalize_date("2024-12-25").unwrap(), "2024-12-25");
    }

    #[test]
    fn rejects_non_dates() {
        for raw in ["", "tomorrow", "13/01/2024", "02/30/2024", "12/25/24", "2024/12"] {
            assert!(
                matches!(normalize_date(raw), Err(AppError::InvalidRequest(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn tacos_example() {
        let store = MemoryStore::default().with_row(
            "2024-12-25",
            "Dinner",
            row("A", "Tacos", "Entree", Some("WHEAT, SOY")),
        );
        let halls = service(store).get_menu("12/25/2024", "Dinner").await.unwrap();
        assert_eq!(halls.len(), 1);
        assert_eq!(halls[0].name, "A");
        assert_eq!(halls[0].food_items.len(), 1);
        assert_eq!(halls[0].food_items[0].name, "Tacos");
        assert_eq!(halls[0].food_items[0].allergens, vec!["gluten", "soy"]);
    }

    #[tokio::test]
    async fn both_date_forms_yield_identical_results() {
        let store = MemoryStore::default()
            .with_row("2024-12-25", "Dinner", row("Branner Dining", "Pho", "Soup", Some("FISH")))
            .with_row("2024-12-25", "Dinner", row("Arrillaga Family Dining Commons", "Tofu", "Entree", None))
            .with_row("2024-12-25", "Lunch", row("Branner Dining", "Salad", "Greens", None));
        let menu = service(store);
        let slashed = menu.get_menu("12/25/2024", "Dinner").await.unwrap();
        let dashed = menu.get_menu("2024-12-25", "Dinner").await.unwrap();
        assert_eq!(slashed, dashed);
        assert_eq!(slashed.len(), 2);
        assert_eq!(slashed[0].name, "Arrillaga Family Dining Commons");
    }

    #[tokio::test]
    async fn no_rows_is_empty_not_error() {
        let halls = service(MemoryStore::default())
            .get_menu("2024-12-25", "Brunch")
            .await
            .unwrap();
        assert!(halls.is_empty());
    }

    #[test]
    fn grouping_keeps_first_seen_hall_order_and_drops_duplicate_items() {
        let rows = vec![
            row("A", "Tacos", "Entree", Some("wheat")),
            row("A", "TACOS", "Entree", Some("milk")),
            row("A", "Rice", "Sides", None),
            row("B", "Tacos", "Entree", None),
        ];
        let halls = group_rows(rows);
        assert_eq!(halls.len(), 2);
        let names: Vec<&str> = halls[0].food_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Tacos", "Rice"]);
        assert_eq!(halls[0].food_items[0].allergens, vec!["gluten"]);
        assert_eq!(halls[1].food_items.len(), 1);

        for hall in &halls {
            let mut seen = HashSet::new();
            for item in &hall.food_items {
                assert!(seen.insert(item.name.to_lowercase()));
            }
        }
    }

    #[test]
    fn passes_text_fields_through_and_derives_diet_flags() {
        let mut r = row("A", "Curry", "Entree", None);
        r.ingredients = Some("chickpeas, spinach".to_string());
        r.diet_tags = Some("VGN, gf".to_string());
        r.notes = Some("spicy".to_string());
        let halls = group_rows(vec![r]);
        let item = &halls[0].food_items[0];
        assert_eq!(item.ingredients.as_deref(), Some("chickpeas, spinach"));
        assert_eq!(item.diet_tags.as_deref(), Some("VGN, gf"));
        assert_eq!(item.diet_flags, vec!["VG", "GF"]);
        assert_eq!(item.notes.as_deref(), Some("spicy"));
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let menu = MenuService::new(Arc::new(DownStore));
        let err = menu.get_menu("2024-12-25", "Dinner").await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
        assert!(matches!(
            menu.list_dining_halls().await,
            Err(AppError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn lists_halls_and_dates() {
        let store = MemoryStore::default()
            .with_row("2024-12-26", "Dinner", row("B", "Soup", "Soup", None))
            .with_row("2024-12-25", "Dinner", row("A", "Tacos", "Entree", None));
        let menu = service(store);
        assert_eq!(menu.list_dining_halls().await.unwrap(), vec!["A", "B"]);
        assert_eq!(
            menu.list_available_dates().await.unwrap(),
            vec!["2024-12-25", "2024-12-26"]
        );
    }
}
