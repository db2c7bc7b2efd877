/// Lenient reading of model ranking output.
///
/// Models wrap JSON in prose and code fences, return a bare object instead of an array, or
/// put numbers in strings. The text is tried against an ordered list of strategies; the first
/// that yields a JSON array holding at least one object (or an object, promoted to a
/// one-element array) wins.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;

/// One hall as the model described it. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelHall {
    pub name: Option<String>,
    pub score: Option<f64>,
    pub reason: Option<String>,
    pub best_food_item: Option<String>,
    /// `None` when the model left the key out entirely.
    pub food_items: Option<Vec<ModelItem>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelItem {
    pub name: Option<String>,
    pub station: Option<String>,
    pub ingredients: Option<String>,
    pub allergens: Vec<String>,
    pub diet_tags: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub relevance_score: Option<i32>,
}

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("valid regex"));

type Strategy = fn(&str) -> Option<Vec<Value>>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct),
    ("first_embedded", first_embedded),
    ("trimmed", parse_trimmed),
];

pub fn parse_ranking(text: &str) -> Result<Vec<ModelHall>, AppError> {
    let cleaned = strip_code_fences(text);
    for (name, strategy) in STRATEGIES {
        if let Some(values) = strategy(&cleaned) {
            debug!(strategy = name, entries = values.len(), "ranking output parsed");
            return Ok(values.iter().filter_map(Value::as_object).map(model_hall).collect());
        }
    }
    let preview: String = cleaned.chars().take(120).collect();
    Err(AppError::RankingParse(format!("no JSON array or object found in {preview:?}")))
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Arrays must hold at least one object; scalars and object-free arrays are not rankings.
fn promote(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(values) => Some(values).filter(|v| v.iter().any(Value::is_object)),
        obj @ Value::Object(_) => Some(vec![obj]),
        _ => None,
    }
}

fn parse_direct(text: &str) -> Option<Vec<Value>> {
    serde_json::from_str(text).ok().and_then(promote)
}

fn leading_value(text: &str) -> Option<Vec<Value>> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
        .and_then(promote)
}

/// Offsets of `[` and `{` that open a value at the outermost level of `text`.
///
/// Brackets nested inside an earlier one are not candidates, so an inner `foodItems` array or
/// a single hall object never wins over a broken outer array.
fn outer_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '[' | '{' => {
                if depth == 0 {
                    starts.push(i);
                }
                depth += 1;
            }
            ']' | '}' if depth > 0 => depth -= 1,
            '"' if depth > 0 => in_string = true,
            _ => {}
        }
    }
    starts
}

/// The earliest outer `[` or `{` that starts a complete ranking value.
fn first_embedded(text: &str) -> Option<Vec<Value>> {
    outer_starts(text)
        .into_iter()
        .find_map(|i| leading_value(&text[i..]))
}

/// Like `first_embedded`, after dropping trailing commas and closing a truncated tail.
fn parse_trimmed(text: &str) -> Option<Vec<Value>> {
    outer_starts(text).into_iter().find_map(|i| {
        let candidate = TRAILING_COMMA_RE.replace_all(&text[i..], "$1");
        leading_value(&close_truncated(&candidate)?)
    })
}

/// Cuts `text` after its first balanced value, or appends the closers a truncated value is
/// missing. `None` for mismatched brackets or a tail cut inside a string.
fn close_truncated(text: &str) -> Option<String> {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => open.push(']'),
            '{' => open.push('}'),
            ']' | '}' => {
                if open.pop() != Some(c) {
                    return None;
                }
                if open.is_empty() {
                    return Some(text[..=i].to_string());
                }
            }
            _ => {}
        }
    }
    if in_string {
        return None;
    }

    let mut repaired = text.trim_end().trim_end_matches(',').to_string();
    repaired.extend(open.iter().rev());
    Some(repaired)
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|n| n.is_finite())
}

fn model_hall(obj: &Map<String, Value>) -> ModelHall {
    let best_food_item = match obj.get("bestFoodItem") {
        Some(Value::Object(item)) => string_field(item, &["name"]),
        _ => string_field(obj, &["bestFoodItem", "bestFoodItemName"]),
    };
    let food_items = obj.get("foodItems").map(|items| match items {
        Value::Array(items) => items.iter().filter_map(model_item).collect(),
        _ => Vec::new(),
    });

    ModelHall {
        name: string_field(obj, &["name", "hallName", "hall"]),
        score: number_field(obj, &["score"]),
        reason: string_field(obj, &["reason"]),
        best_food_item,
        food_items,
    }
}

fn model_item(value: &Value) -> Option<ModelItem> {
    let obj = match value {
        Value::String(name) => {
            return Some(ModelItem {
                name: Some(name.trim().to_string()).filter(|s| !s.is_empty()),
                ..ModelItem::default()
            })
        }
        Value::Object(obj) => obj,
        _ => return None,
    };

    let allergens = match obj.get("allergens") {
        Some(Value::Array(tokens)) => tokens
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(raw)) => raw.split(',').map(|t| t.trim().to_string()).collect(),
        _ => Vec::new(),
    };

    Some(ModelItem {
        name: string_field(obj, &["name"]),
        station: string_field(obj, &["station"]),
        ingredients: string_field(obj, &["ingredients"]),
        allergens,
        diet_tags: string_field(obj, &["dietTags", "diet_tags"]),
        category: string_field(obj, &["category"]),
        notes: string_field(obj, &["notes"]),
        relevance_score: number_field(obj, &["relevanceScore", "relevance_score"])
            .map(|n| n.round() as i32),
    })
}
