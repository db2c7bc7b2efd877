/// Allergen and diet-tag normalization.
///
/// Storage keeps both as free comma-separated text ("SOY, WHEAT", "VGN,GF"). The menu
/// view exposes them as canonical tokens so clients can filter on a fixed vocabulary.

/// Canonical allergen for a trimmed, lowercased token. Unknown tokens map to themselves.
fn canonical_allergen(token: &str) -> &str {
    match token {
        "wheat" => "gluten",
        "milk" => "dairy",
        "egg" | "eggs" => "eggs",
        "soy" => "soy",
        "fish" => "fish",
        "shellfish" => "shellfish",
        "peanut" | "peanuts" | "treenuts" | "tree nuts" | "sesame" => "nuts",
        other => other,
    }
}

fn canonical_diet_tag(token: &str) -> String {
    match token.to_lowercase().as_str() {
        "gf" | "gluten-free" => "GF".to_string(),
        "v" | "vegetarian" => "V".to_string(),
        "vg" | "vgn" | "vegan" => "VG".to_string(),
        "halal" => "Halal".to_string(),
        _ => token.to_uppercase(),
    }
}

/// Trim and collapse internal whitespace runs. Blank tokens become `None`.
fn clean_token(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

fn push_unique(out: &mut Vec<String>, token: String) {
    if !out.contains(&token) {
        out.push(token);
    }
}

/// Normalize a list of allergen tokens. Idempotent on its own output.
pub fn normalize_allergen_list<'a, I>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for token in tokens.into_iter().filter_map(clean_token) {
        let lowered = token.to_lowercase();
        push_unique(&mut out, canonical_allergen(&lowered).to_string());
    }
    out
}

/// Normalize a raw comma-separated allergen field.
pub fn normalize_allergens(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) => normalize_allergen_list(raw.split(',')),
        None => Vec::new(),
    }
}

/// Normalize a raw comma-separated diet tag field.
pub fn normalize_diet_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for token in raw.split(',').filter_map(clean_token) {
        push_unique(&mut out, canonical_diet_tag(&token));
    }
    out
}
