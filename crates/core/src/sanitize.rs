use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::intent::{
    self, default_start_date, fallback_adults, fallback_budget, fallback_children,
    fallback_destination, fallback_seniors, fallback_themes, infer_currency, truncate_notes,
};
use crate::models::{
    Currency, DayPlan, Preferences, Theme, Travelers, TripIntent, TripPlan,
};
use crate::planner;

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static FENCE_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[a-zA-Z]*\n?").unwrap());

/// The model is free to emit `budget` either as a bare number or as a nested
/// object; both shapes narrow through here before any field is read.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetField {
    Flat(f64),
    Nested {
        total: Option<f64>,
        currency: Option<String>,
    },
    Absent,
}

impl BudgetField {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(value) => {
                if let Some(total) = as_non_negative_number(value) {
                    Self::Flat(total)
                } else if let Some(object) = value.as_object() {
                    Self::Nested {
                        total: object.get("total").and_then(as_non_negative_number),
                        currency: object
                            .get("currency")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }
                } else {
                    Self::Absent
                }
            }
            None => Self::Absent,
        }
    }

    pub fn total(&self) -> Option<f64> {
        match self {
            Self::Flat(total) => Some(*total),
            Self::Nested { total, .. } => *total,
            Self::Absent => None,
        }
    }

    pub fn currency(&self) -> Option<&str> {
        match self {
            Self::Nested { currency, .. } => currency.as_deref(),
            _ => None,
        }
    }
}

/// Drop a Markdown code fence around a JSON payload, if present.
pub fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with("```") && trimmed.contains('{') {
        let without_open = FENCE_OPEN_RE.replace(trimmed, "");
        without_open
            .strip_suffix("```")
            .unwrap_or(&without_open)
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Repair the model's raw intent output field by field. Missing or malformed
/// fields are refilled from the rule-based extractor run over the *original
/// transcript*, so model-derived and rule-derived values stay consistent.
/// Unparsable output discards the model entirely and returns the pure
/// heuristic result; the return value is always fully typed.
pub fn sanitize_intent(raw: &str, transcript: &str) -> TripIntent {
    let normalized = strip_code_fence(raw);

    let parsed: Value = match serde_json::from_str(&normalized) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "intent JSON parse failed, using heuristic extraction");
            return intent::extract(transcript);
        }
    };
    let Some(data) = parsed.as_object() else {
        return intent::extract(transcript);
    };

    let budget_field = BudgetField::from_value(data.get("budget"));

    let start_date = normalize_date(data.get("startDate"));
    let mut end_date = normalize_date(data.get("endDate"));
    if end_date < start_date {
        end_date = start_date;
    }

    let destination = data
        .get("destination")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback_destination(transcript));

    let currency = data
        .get("currency")
        .and_then(Value::as_str)
        .or_else(|| budget_field.currency())
        .and_then(Currency::parse)
        .unwrap_or_else(|| infer_currency(transcript));

    let travelers_data = data.get("travelers").and_then(Value::as_object);
    let travelers = Travelers {
        adults: count_field(travelers_data, "adults")
            .unwrap_or_else(|| fallback_adults(transcript))
            .max(1),
        children: count_field(travelers_data, "children")
            .unwrap_or_else(|| fallback_children(transcript)),
        seniors: count_field(travelers_data, "seniors")
            .unwrap_or_else(|| fallback_seniors(transcript)),
    };

    let themes = data
        .get("preferences")
        .and_then(|value| value.get("themes"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .filter_map(Theme::parse)
                .collect::<Vec<_>>()
        })
        .filter(|themes| !themes.is_empty())
        .unwrap_or_else(|| fallback_themes(transcript));

    let notes = data
        .get("notes")
        .and_then(Value::as_str)
        .map(truncate_notes)
        .unwrap_or_else(|| truncate_notes(transcript));

    TripIntent {
        destination,
        start_date,
        end_date,
        budget: budget_field
            .total()
            .unwrap_or_else(|| fallback_budget(transcript)),
        currency,
        travelers,
        preferences: Preferences { themes },
        notes,
    }
}

/// Plan sanitization is deliberately coarser than intent sanitization:
/// `highlights` and `itinerary` are taken as-is when they are arrays
/// (itinerary entries that do not decode as a day are dropped), and each
/// budget sub-field defaults to its proportional share of the intent budget.
pub fn sanitize_plan(raw: &str, intent: &TripIntent) -> TripPlan {
    let normalized = strip_code_fence(raw);

    let parsed: Value = match serde_json::from_str(&normalized) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "plan JSON parse failed, using templated plan");
            return planner::build_mock_plan(intent);
        }
    };
    let Some(data) = parsed.as_object() else {
        return planner::build_mock_plan(intent);
    };

    let highlights = data
        .get("highlights")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let itinerary: Vec<DayPlan> = data
        .get("itinerary")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|value| serde_json::from_value(value.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let budget_data = data.get("budget").and_then(Value::as_object);
    let budget_number = |key: &str, share: f64| {
        budget_data
            .and_then(|object| object.get(key))
            .and_then(as_non_negative_number)
            .unwrap_or_else(|| (intent.budget * share).round())
    };

    let budget = crate::models::BudgetEstimate {
        currency: budget_data
            .and_then(|object| object.get("currency"))
            .and_then(Value::as_str)
            .and_then(Currency::parse)
            .unwrap_or(intent.currency),
        total: budget_data
            .and_then(|object| object.get("total"))
            .and_then(as_non_negative_number)
            .unwrap_or(intent.budget),
        transportation: budget_number("transportation", planner::TRANSPORTATION_SHARE),
        lodging: budget_number("lodging", planner::LODGING_SHARE),
        activities: budget_number("activities", planner::ACTIVITIES_SHARE),
        dining: budget_number("dining", planner::DINING_SHARE),
        contingency: budget_number("contingency", planner::CONTINGENCY_SHARE),
    };

    let now = chrono::Utc::now();

    TripPlan {
        id: format!("plan-{}", Uuid::new_v4()),
        destination: intent.destination.clone(),
        start_date: intent.start_date,
        end_date: intent.end_date,
        duration_days: intent.duration_days(),
        traveler_profile: intent.travelers,
        preferences: intent.preferences.clone(),
        highlights,
        itinerary,
        budget,
        created_at: now,
        updated_at: now,
    }
}

/// Find a `YYYY-MM-DD` substring anywhere in the value; anything else gets
/// the standard 14-days-out default.
fn normalize_date(value: Option<&Value>) -> NaiveDate {
    value
        .and_then(Value::as_str)
        .and_then(|text| ISO_DATE_RE.find(text))
        .and_then(|found| NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d").ok())
        .unwrap_or_else(default_start_date)
}

fn as_non_negative_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .filter(|number| number.is_finite() && *number >= 0.0)
}

fn count_field(
    object: Option<&serde_json::Map<String, Value>>,
    key: &str,
) -> Option<u32> {
    object
        .and_then(|map| map.get(key))
        .and_then(Value::as_u64)
        .map(|count| count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    const TRANSCRIPT: &str = "我想去东京玩五天，预算两万元，带两个孩子，喜欢美食";

    fn base_intent() -> TripIntent {
        intent::extract(TRANSCRIPT)
    }

    #[test]
    fn fenced_output_parses_like_bare_output() {
        let bare = json!({
            "destination": "东京",
            "startDate": "2026-10-01",
            "endDate": "2026-10-05",
            "budget": 20000,
            "currency": "CNY",
            "travelers": {"adults": 2, "children": 2, "seniors": 0},
            "preferences": {"themes": ["culinary", "family"]},
            "notes": "家庭出游"
        })
        .to_string();
        let fenced = format!("```json\n{bare}\n```");

        let from_bare = sanitize_intent(&bare, TRANSCRIPT);
        let from_fenced = sanitize_intent(&fenced, TRANSCRIPT);

        assert_eq!(from_bare.destination, from_fenced.destination);
        assert_eq!(from_bare.start_date, from_fenced.start_date);
        assert_eq!(from_bare.budget, from_fenced.budget);
        assert_eq!(from_bare.notes, from_fenced.notes);
    }

    #[test]
    fn truncated_json_falls_back_to_pure_heuristics() {
        let repaired = sanitize_intent("{\"destination\": \"东", TRANSCRIPT);
        let heuristic = base_intent();

        assert_eq!(repaired.destination, heuristic.destination);
        assert_eq!(repaired.budget, heuristic.budget);
        assert_eq!(repaired.travelers.children, heuristic.travelers.children);
    }

    #[test]
    fn missing_fields_are_repaired_from_the_transcript() {
        let partial = json!({ "destination": "京都" }).to_string();
        let repaired = sanitize_intent(&partial, TRANSCRIPT);

        assert_eq!(repaired.destination, "京都");
        assert_eq!(repaired.budget, 20_000.0);
        assert_eq!(repaired.travelers.children, 2);
        assert!(repaired.preferences.themes.contains(&Theme::Culinary));
        assert!(repaired.end_date >= repaired.start_date);
    }

    #[test]
    fn nested_budget_object_narrows_to_total() {
        let nested = json!({
            "budget": {"total": 32000, "currency": "JPY"}
        })
        .to_string();
        let repaired = sanitize_intent(&nested, TRANSCRIPT);

        assert_eq!(repaired.budget, 32_000.0);
        assert_eq!(repaired.currency, Currency::JPY);
    }

    #[test]
    fn invalid_currency_code_falls_back_to_keyword_inference() {
        let bad = json!({ "currency": "yuan-ish" }).to_string();
        let repaired = sanitize_intent(&bad, TRANSCRIPT);
        assert_eq!(repaired.currency, Currency::CNY);
    }

    #[test]
    fn dates_are_scanned_out_of_noisy_strings() {
        let noisy = json!({
            "startDate": "around 2026-10-01 or so",
            "endDate": "definitely 2026-10-04"
        })
        .to_string();
        let repaired = sanitize_intent(&noisy, TRANSCRIPT);

        assert_eq!(
            repaired.start_date,
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
        );
        assert_eq!(
            repaired.end_date,
            NaiveDate::from_ymd_opt(2026, 10, 4).unwrap()
        );
    }

    #[test]
    fn end_date_never_precedes_start_date() {
        let inverted = json!({
            "startDate": "2026-10-10",
            "endDate": "2026-10-02"
        })
        .to_string();
        let repaired = sanitize_intent(&inverted, TRANSCRIPT);
        assert_eq!(repaired.end_date, repaired.start_date);
    }

    #[test]
    fn budget_field_classifies_all_shapes() {
        assert_eq!(
            BudgetField::from_value(Some(&json!(5000))),
            BudgetField::Flat(5000.0)
        );
        assert_eq!(
            BudgetField::from_value(Some(&json!({"total": 800}))).total(),
            Some(800.0)
        );
        assert_eq!(BudgetField::from_value(Some(&json!("lots"))).total(), None);
        assert_eq!(BudgetField::from_value(None), BudgetField::Absent);
        assert_eq!(BudgetField::from_value(Some(&json!(-10))).total(), None);
    }

    #[test]
    fn plan_sanitizer_defaults_budget_shares_and_drops_bad_days() {
        let intent = base_intent();
        let raw = json!({
            "title": "东京之旅",
            "highlights": ["第一站", "第二站"],
            "budget": {"total": 20000},
            "itinerary": [
                {
                    "date": intent.start_date.to_string(),
                    "summary": "抵达",
                    "items": []
                },
                {"summary": 42}
            ]
        })
        .to_string();

        let plan = sanitize_plan(&raw, &intent);

        assert_eq!(plan.highlights.len(), 2);
        assert_eq!(plan.itinerary.len(), 1);
        assert_eq!(plan.budget.total, 20_000.0);
        assert_eq!(plan.budget.transportation, (20_000.0_f64 * 0.25).round());
        assert_eq!(plan.budget.currency, intent.currency);
        assert_eq!(plan.duration_days, intent.duration_days());
    }

    #[test]
    fn unparsable_plan_output_returns_the_templated_plan() {
        let intent = base_intent();
        let plan = sanitize_plan("not json at all", &intent);

        assert_eq!(plan.itinerary.len() as i64, plan.duration_days);
        assert_eq!(plan.budget.transportation, (intent.budget * 0.25).round());
        for pair in plan.itinerary.windows(2) {
            assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
        }
    }
}
