use std::fmt;

use serde::{Deserialize, Serialize};

/// One `menu_item` row for a (date, meal), as selected by the store.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MenuRow {
    pub hall_name: String,
    pub item_name: String,
    pub station: Option<String>,
    pub ingredients: Option<String>,
    /// Raw comma-separated allergen text, e.g. "SOY, WHEAT".
    pub allergens: Option<String>,
    pub diet_tags: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

/// A food item as served for one hall. Owned by its `DiningHall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub name: String,
    pub station: Option<String>,
    pub ingredients: Option<String>,
    /// Canonical allergen tokens, first-seen order.
    #[serde(default)]
    pub allergens: Vec<String>,
    /// Raw diet tag text as stored.
    pub diet_tags: Option<String>,
    /// Normalized diet tags derived from `diet_tags`.
    #[serde(default)]
    pub diet_flags: Vec<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiningHall {
    pub name: String,
    pub food_items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// `lat,lon` as the distance-matrix API expects it.
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

/// Travel estimate from the caller's origin to one hall.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtaResult {
    #[serde(rename = "hall")]
    pub hall_name: String,
    pub distance_km: Option<f64>,
    #[serde(rename = "walk_min")]
    pub walk_minutes: Option<f64>,
    #[serde(rename = "bike_min")]
    pub bike_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedFoodItem {
    #[serde(flatten)]
    pub item: MenuItem,
    pub relevance_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHall {
    pub name: String,
    pub food_items: Vec<RankedFoodItem>,
    /// Always within 1..=10.
    pub score: u8,
    pub reason: String,
    #[serde(rename = "bestFoodItem")]
    pub best_food_item_name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Meal {
    Breakfast,
    Lunch,
    Dinner,
    Brunch,
}

impl Meal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Meal::Breakfast => "Breakfast",
            Meal::Lunch => "Lunch",
            Meal::Dinner => "Dinner",
            Meal::Brunch => "Brunch",
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
