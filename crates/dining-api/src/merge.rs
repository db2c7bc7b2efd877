/// Reconciles parsed model output with the authoritative menu.
///
/// The model is trusted for ordering, scores and prose. Names, allergens and any field it
/// dropped come back from the menu the prompt was built from.
use std::collections::HashSet;

use crate::allergens::{normalize_allergen_list, normalize_diet_tags};
use crate::error::AppError;
use crate::model::{DiningHall, MenuItem, RankedFoodItem, RankedHall};
use crate::parser::{ModelHall, ModelItem};

const DEFAULT_REASON: &str = "Relevant to your query";
const MATCHED_DEFAULT_SCORE: u8 = 7;
const UNMATCHED_DEFAULT_SCORE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Items filtered to what the query asked for.
    Targeted,
    /// Every item shown; the ranking is about overall quality.
    General,
}

/// Exact name first, then case-insensitive containment either way.
pub fn match_hall<'a>(name: &str, halls: &'a [DiningHall]) -> Option<&'a DiningHall> {
    if let Some(hall) = halls.iter().find(|h| h.name == name) {
        return Some(hall);
    }
    let wanted = name.to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    halls.iter().find(|h| {
        let have = h.name.to_lowercase();
        !have.is_empty() && (have.contains(&wanted) || wanted.contains(&have))
    })
}

pub fn clamp_score(score: Option<f64>, matched: bool) -> u8 {
    match score {
        Some(s) if s.is_finite() => s.round().clamp(1.0, 10.0) as u8,
        _ if matched => MATCHED_DEFAULT_SCORE,
        _ => UNMATCHED_DEFAULT_SCORE,
    }
}

/// Merge model halls into ranked halls, highest score first.
///
/// Fails when no entry carries a name, since the model output then says nothing usable.
pub fn merge_rankings(
    parsed: Vec<ModelHall>,
    authoritative: &[DiningHall],
    mode: RankingMode,
) -> Result<Vec<RankedHall>, AppError> {
    let mut seen = HashSet::new();
    let mut ranked = Vec::new();

    for entry in parsed {
        let Some(model_name) = entry.name.as_deref() else {
            continue;
        };
        let matched = match_hall(model_name, authoritative);
        let name = matched.map_or(model_name, |h| h.name.as_str()).to_string();
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        ranked.push(merge_hall(name, &entry, matched, mode));
    }

    if ranked.is_empty() {
        return Err(AppError::RankingParse(
            "model output named no dining halls".to_string(),
        ));
    }

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(ranked)
}

fn merge_hall(
    name: String,
    entry: &ModelHall,
    matched: Option<&DiningHall>,
    mode: RankingMode,
) -> RankedHall {
    let food_items = match (&entry.food_items, matched) {
        (None, Some(hall)) => hall.food_items.iter().map(unranked).collect(),
        (None, None) => Vec::new(),
        (Some(items), Some(hall)) if mode == RankingMode::General => {
            cover_authoritative(items, &hall.food_items)
        }
        (Some(items), Some(hall)) => merge_items(items, &hall.food_items),
        (Some(items), None) => merge_items(items, &[]),
    };

    let best_food_item_name = entry
        .best_food_item
        .clone()
        .or_else(|| food_items.first().map(|i| i.item.name.clone()))
        .or_else(|| matched.and_then(|h| h.food_items.first()).map(|i| i.name.clone()));

    RankedHall {
        name,
        food_items,
        score: clamp_score(entry.score, matched.is_some()),
        reason: entry.reason.clone().unwrap_or_else(|| DEFAULT_REASON.to_string()),
        best_food_item_name,
        image: None,
    }
}

fn unranked(item: &MenuItem) -> RankedFoodItem {
    RankedFoodItem {
        item: item.clone(),
        relevance_score: 0,
    }
}

fn find_item<'a>(name: &str, items: &'a [MenuItem]) -> Option<&'a MenuItem> {
    let wanted = name.to_lowercase();
    items.iter().find(|i| i.name.to_lowercase() == wanted)
}

/// Model items restored against the menu, deduplicated by name (first wins).
fn merge_items(model_items: &[ModelItem], authoritative: &[MenuItem]) -> Vec<RankedFoodItem> {
    let mut seen = HashSet::new();
    model_items
        .iter()
        .filter_map(|m| {
            let name = m.name.as_deref()?;
            seen.insert(name.to_lowercase())
                .then(|| merge_item(name, m, find_item(name, authoritative)))
        })
        .collect()
}

/// Exactly the menu's items: those the model listed first in its order, then the rest.
fn cover_authoritative(model_items: &[ModelItem], authoritative: &[MenuItem]) -> Vec<RankedFoodItem> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(authoritative.len());

    for m in model_items {
        let Some(name) = m.name.as_deref() else {
            continue;
        };
        if let Some(auth) = find_item(name, authoritative) {
            if seen.insert(auth.name.to_lowercase()) {
                merged.push(merge_item(&auth.name, m, Some(auth)));
            }
        }
    }
    for auth in authoritative {
        if seen.insert(auth.name.to_lowercase()) {
            merged.push(unranked(auth));
        }
    }
    merged
}

fn merge_item(name: &str, model: &ModelItem, auth: Option<&MenuItem>) -> RankedFoodItem {
    let pick = |ours: &Option<String>, theirs: Option<&Option<String>>| {
        ours.clone().or_else(|| theirs.and_then(|t| t.clone()))
    };

    let allergens = normalize_allergen_list(
        model
            .allergens
            .iter()
            .map(String::as_str)
            .chain(auth.into_iter().flat_map(|a| a.allergens.iter().map(String::as_str))),
    );
    let diet_tags = pick(&model.diet_tags, auth.map(|a| &a.diet_tags));
    let diet_flags = match (&model.diet_tags, auth) {
        (None, Some(a)) => a.diet_flags.clone(),
        _ => normalize_diet_tags(diet_tags.as_deref()),
    };

    RankedFoodItem {
        item: MenuItem {
            name: auth.map_or(name, |a| a.name.as_str()).to_string(),
            station: pick(&model.station, auth.map(|a| &a.station)),
            ingredients: pick(&model.ingredients, auth.map(|a| &a.ingredients)),
            allergens,
            diet_tags,
            diet_flags,
            category: pick(&model.category, auth.map(|a| &a.category)),
            notes: pick(&model.notes, auth.map(|a| &a.notes)),
        },
        relevance_score: model.relevance_score.unwrap_or(0),
    }
}
