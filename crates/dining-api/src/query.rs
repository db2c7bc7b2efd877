/// Pulls a meal and a date out of free-text queries, plus the campus meal schedule.
use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike, Weekday};
use regex::Regex;

use crate::model::Meal;

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid regex"));
static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})").expect("valid regex"));
static BREAKFAST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(brkfst|morning)\b").expect("valid regex"));
static LUNCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(noon|midday)\b").expect("valid regex"));
static DINNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(evening|night|supper)\b").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub meal: Meal,
    pub date: Option<String>,
}

/// First `M/D/YYYY` as written, else `M/D` in `today`'s year, else "today"/"tomorrow".
pub fn extract_date(query: &str, today: NaiveDate) -> Option<String> {
    if let Some(m) = FULL_DATE_RE.find(query) {
        return Some(m.as_str().to_string());
    }
    if let Some(caps) = SHORT_DATE_RE.captures(query) {
        return Some(format!("{}/{}/{}", &caps[1], &caps[2], today.year()));
    }

    let lowered = query.to_lowercase();
    if lowered.contains("today") {
        return Some(today.format("%m/%d/%Y").to_string());
    }
    if lowered.contains("tomorrow") {
        let tomorrow = today.checked_add_days(Days::new(1))?;
        return Some(tomorrow.format("%m/%d/%Y").to_string());
    }
    None
}

pub fn extract_meal(query: &str) -> Option<Meal> {
    let lowered = query.to_lowercase();

    // "brunch" contains "lunch"
    for (keyword, meal) in [
        ("breakfast", Meal::Breakfast),
        ("brunch", Meal::Brunch),
        ("lunch", Meal::Lunch),
        ("dinner", Meal::Dinner),
    ] {
        if lowered.contains(keyword) {
            return Some(meal);
        }
    }

    if BREAKFAST_RE.is_match(&lowered) {
        Some(Meal::Breakfast)
    } else if LUNCH_RE.is_match(&lowered) {
        Some(Meal::Lunch)
    } else if DINNER_RE.is_match(&lowered) {
        Some(Meal::Dinner)
    } else {
        None
    }
}

pub fn parse_query(
    query: &str,
    default_meal: Meal,
    default_date: Option<&str>,
    today: NaiveDate,
) -> ParsedQuery {
    ParsedQuery {
        meal: extract_meal(query).unwrap_or(default_meal),
        date: extract_date(query, today).or_else(|| default_date.map(str::to_string)),
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The meal being served at `now`, or the next one if between services.
pub fn current_meal(now: NaiveDateTime) -> Meal {
    let hour = now.hour();
    if is_weekend(now.date()) {
        if hour < 14 {
            Meal::Brunch
        } else {
            Meal::Dinner
        }
    } else if hour < 11 {
        Meal::Breakfast
    } else if hour < 15 {
        Meal::Lunch
    } else {
        Meal::Dinner
    }
}

pub fn available_meals(date: NaiveDate) -> Vec<Meal> {
    if is_weekend(date) {
        vec![Meal::Brunch, Meal::Dinner]
    } else {
        vec![Meal::Breakfast, Meal::Lunch, Meal::Dinner]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, hour: u32) -> NaiveDateTime {
        date.and_hms_opt(hour, 30, 0).unwrap()
    }

    #[test]
    fn explicit_dates_are_returned_as_written() {
        let today = day(2024, 12, 20);
        assert_eq!(
            extract_date("vegan food on 12/25/2024 please", today).as_deref(),
            Some("12/25/2024")
        );
        assert_eq!(extract_date("pho 1/5/2025", today).as_deref(), Some("1/5/2025"));
    }

    #[test]
    fn short_dates_take_the_current_year() {
        assert_eq!(
            extract_date("dinner on 3/4", day(2025, 1, 1)).as_deref(),
            Some("3/4/2025")
        );
    }

    #[test]
    fn relative_dates() {
        let today = day(2024, 12, 31);
        assert_eq!(extract_date("what's good Today", today).as_deref(), Some("12/31/2024"));
        assert_eq!(extract_date("tomorrow lunch", today).as_deref(), Some("01/01/2025"));
        assert_eq!(extract_date("spicy noodles", today), None);
    }

    #[test]
    fn brunch_is_not_lunch() {
        assert_eq!(extract_meal("best BRUNCH spot"), Some(Meal::Brunch));
        assert_eq!(extract_meal("lunch with friends"), Some(Meal::Lunch));
        assert_eq!(extract_meal("breakfast burrito"), Some(Meal::Breakfast));
    }

    #[test]
    fn synonyms_need_word_boundaries() {
        assert_eq!(extract_meal("late night snack"), Some(Meal::Dinner));
        assert_eq!(extract_meal("something at noon"), Some(Meal::Lunch));
        assert_eq!(extract_meal("morning oats"), Some(Meal::Breakfast));
        assert_eq!(extract_meal("knights of the round table"), None);
        assert_eq!(extract_meal("tacos"), None);
    }

    #[test]
    fn parse_query_falls_back_to_defaults() {
        let today = day(2024, 12, 20);
        assert_eq!(
            parse_query("gluten free pasta", Meal::Dinner, Some("12/20/2024"), today),
            ParsedQuery {
                meal: Meal::Dinner,
                date: Some("12/20/2024".to_string())
            }
        );
        assert_eq!(
            parse_query("lunch on 12/25/2024", Meal::Dinner, None, today),
            ParsedQuery {
                meal: Meal::Lunch,
                date: Some("12/25/2024".to_string())
            }
        );
    }

    #[test]
    fn weekday_schedule() {
        let wednesday = day(2024, 12, 18);
        assert_eq!(current_meal(at(wednesday, 6)), Meal::Breakfast);
        assert_eq!(current_meal(at(wednesday, 10)), Meal::Breakfast);
        assert_eq!(current_meal(at(wednesday, 11)), Meal::Lunch);
        assert_eq!(current_meal(at(wednesday, 14)), Meal::Lunch);
        assert_eq!(current_meal(at(wednesday, 15)), Meal::Dinner);
        assert_eq!(current_meal(at(wednesday, 22)), Meal::Dinner);
    }

    #[test]
    fn weekend_schedule() {
        let saturday = day(2024, 12, 21);
        assert_eq!(current_meal(at(saturday, 8)), Meal::Brunch);
        assert_eq!(current_meal(at(saturday, 13)), Meal::Brunch);
        assert_eq!(current_meal(at(saturday, 14)), Meal::Dinner);
        assert_eq!(available_meals(saturday), vec![Meal::Brunch, Meal::Dinner]);
        assert_eq!(
            available_meals(day(2024, 12, 23)),
            vec![Meal::Breakfast, Meal::Lunch, Meal::Dinner]
        );
    }
}
