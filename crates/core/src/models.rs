use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    CNY,
    USD,
    JPY,
    EUR,
    HKD,
}

impl Currency {
    /// Strict code parse; keyword inference over free text lives in
    /// `intent::infer_currency`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "CNY" => Some(Self::CNY),
            "USD" => Some(Self::USD),
            "JPY" => Some(Self::JPY),
            "EUR" => Some(Self::EUR),
            "HKD" => Some(Self::HKD),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::CNY => "CNY",
            Self::USD => "USD",
            Self::JPY => "JPY",
            Self::EUR => "EUR",
            Self::HKD => "HKD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Culinary,
    Family,
    Culture,
    Nature,
    Adventure,
    Relaxation,
    Shopping,
    Nightlife,
}

impl Theme {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "culinary" => Some(Self::Culinary),
            "family" => Some(Self::Family),
            "culture" => Some(Self::Culture),
            "nature" => Some(Self::Nature),
            "adventure" => Some(Self::Adventure),
            "relaxation" => Some(Self::Relaxation),
            "shopping" => Some(Self::Shopping),
            "nightlife" => Some(Self::Nightlife),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Culinary => "culinary",
            Self::Family => "family",
            Self::Culture => "culture",
            Self::Nature => "nature",
            Self::Adventure => "adventure",
            Self::Relaxation => "relaxation",
            Self::Shopping => "shopping",
            Self::Nightlife => "nightlife",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Travelers {
    pub adults: u32,
    pub children: u32,
    pub seniors: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub themes: Vec<Theme>,
}

/// Structured travel request. Every field is populated after extraction;
/// there is no partially-filled variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripIntent {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    pub currency: Currency,
    pub travelers: Travelers,
    pub preferences: Preferences,
    pub notes: String,
}

impl TripIntent {
    /// Inclusive calendar day count, never below 1.
    pub fn duration_days(&self) -> i64 {
        ((self.end_date - self.start_date).num_days() + 1).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub date: NaiveDate,
    pub summary: String,
    #[serde(default)]
    pub items: Vec<ScheduleItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetEstimate {
    pub currency: Currency,
    pub total: f64,
    pub transportation: f64,
    pub lodging: f64,
    pub activities: f64,
    pub dining: f64,
    pub contingency: f64,
}

/// Day-by-day itinerary with budget breakdown, produced fresh per request
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub id: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
    pub traveler_profile: Travelers,
    pub preferences: Preferences,
    pub highlights: Vec<String>,
    pub itinerary: Vec<DayPlan>,
    pub budget: BudgetEstimate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentProvider {
    Dashscope,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanProvider {
    Dashscope,
    Mock,
}
