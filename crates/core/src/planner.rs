use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    BudgetEstimate, DayPlan, Location, ScheduleItem, TripIntent, TripPlan,
};

// Fixed budget split used by the templated plan and as the per-field default
// when sanitizing model output: 25/30/20/20/5, summing to 100%.
pub const TRANSPORTATION_SHARE: f64 = 0.25;
pub const LODGING_SHARE: f64 = 0.30;
pub const ACTIVITIES_SHARE: f64 = 0.20;
pub const DINING_SHARE: f64 = 0.20;
pub const CONTINGENCY_SHARE: f64 = 0.05;

/// Expand an intent into a templated plan. Total: any syntactically valid
/// intent yields one `DayPlan` per inclusive calendar day with four generic
/// time blocks. The per-item costs are illustrative filler, not prices.
pub fn build_mock_plan(intent: &TripIntent) -> TripPlan {
    let duration_days = intent.duration_days();
    let now = Utc::now();

    let itinerary = (0..duration_days)
        .map(|offset| {
            let date = intent.start_date + Duration::days(offset);
            DayPlan {
                date,
                summary: format!("{} · 第 {} 天亮点行程", intent.destination, offset + 1),
                items: day_template(intent),
            }
        })
        .collect();

    let total = if intent.budget > 0.0 {
        intent.budget
    } else {
        10_000.0
    };

    TripPlan {
        id: format!("mock-{}", Uuid::new_v4()),
        destination: intent.destination.clone(),
        start_date: intent.start_date,
        end_date: intent.end_date,
        duration_days,
        traveler_profile: intent.travelers,
        preferences: intent.preferences.clone(),
        highlights: default_highlights(),
        itinerary,
        budget: proportional_budget(intent.currency, total),
        created_at: now,
        updated_at: now,
    }
}

pub fn default_highlights() -> Vec<String> {
    vec![
        "精选地标与必打卡路线".to_string(),
        "本地风味美食与特色体验".to_string(),
        "节奏均衡的每日安排".to_string(),
    ]
}

pub fn proportional_budget(currency: crate::models::Currency, total: f64) -> BudgetEstimate {
    BudgetEstimate {
        currency,
        total,
        transportation: (total * TRANSPORTATION_SHARE).round(),
        lodging: (total * LODGING_SHARE).round(),
        activities: (total * ACTIVITIES_SHARE).round(),
        dining: (total * DINING_SHARE).round(),
        contingency: (total * CONTINGENCY_SHARE).round(),
    }
}

fn day_template(intent: &TripIntent) -> Vec<ScheduleItem> {
    let theme_tags: Vec<String> = intent
        .preferences
        .themes
        .iter()
        .map(|theme| theme.as_code().to_string())
        .collect();

    vec![
        ScheduleItem {
            title: "晨间体验".to_string(),
            description: "根据兴趣安排轻松的城市探索或主题活动。".to_string(),
            start_time: Some("09:00".to_string()),
            end_time: Some("11:30".to_string()),
            location: Some(Location {
                name: "热门景点".to_string(),
                address: Some("地址待确认".to_string()),
                lat: None,
                lon: None,
            }),
            estimated_cost: Some((intent.budget * 0.08).round()),
            tags: Some(theme_tags),
        },
        ScheduleItem {
            title: "特色午餐".to_string(),
            description: "精选当地餐厅或亲子友好餐食。".to_string(),
            start_time: Some("12:00".to_string()),
            end_time: Some("13:30".to_string()),
            location: Some(Location {
                name: "口碑餐厅".to_string(),
                address: None,
                lat: None,
                lon: None,
            }),
            estimated_cost: Some((intent.budget * 0.05).round()),
            tags: Some(vec!["dining".to_string()]),
        },
        ScheduleItem {
            title: "下午主题活动".to_string(),
            description: "结合偏好安排文化体验、户外探索或亲子项目。".to_string(),
            start_time: Some("14:30".to_string()),
            end_time: Some("17:30".to_string()),
            location: Some(Location {
                name: "精选活动场所".to_string(),
                address: None,
                lat: None,
                lon: None,
            }),
            estimated_cost: Some((intent.budget * 0.12).round()),
            tags: Some(vec!["activities".to_string()]),
        },
        ScheduleItem {
            title: "夜间推荐".to_string(),
            description: "可选自由活动或预定演出，详见行程建议列表。".to_string(),
            start_time: Some("19:00".to_string()),
            end_time: Some("21:00".to_string()),
            location: Some(Location {
                name: "夜间体验区域".to_string(),
                address: None,
                lat: None,
                lon: None,
            }),
            estimated_cost: Some((intent.budget * 0.07).round()),
            tags: Some(vec!["nightlife".to_string()]),
        },
    ]
}
