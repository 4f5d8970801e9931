use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Currency, Preferences, Theme, Travelers, TripIntent};

const DEFAULT_DURATION_DAYS: i64 = 5;
const MIN_DURATION_DAYS: i64 = 2;
const MAX_DURATION_DAYS: i64 = 99;
const DEFAULT_BUDGET: f64 = 10_000.0;
const START_DATE_OFFSET_DAYS: i64 = 14;
pub const MAX_NOTES_CHARS: usize = 280;

// Number slot shared by the count/amount patterns: Arabic digits or a simple
// Chinese numeral (一..九, 两, 十, 百).
const NUM: &str = r"\d+(?:\.\d+)?|[一二两三四五六七八九十百]+";

static DESTINATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"去([\p{Han}A-Za-z\s]+)").unwrap());
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({NUM})\s*[天日]")).unwrap());
static BUDGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NUM})\s*(万|千|块钱|元|块|人民币|美金|美元|日元|欧元|港币)"
    ))
    .unwrap()
});
static ADULTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({NUM})\s*[位个名]?\s*(?:成人|大人|成年人)")).unwrap());
static SOLO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"一个人|单人|独自").unwrap());
static COUPLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"情侣|夫妻").unwrap());
static CHILDREN_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({NUM})\s*[位个名]?\s*(?:孩子|儿童|小孩|宝宝|小朋友)")).unwrap()
});
static CHILDREN_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"孩子|儿童|小孩|宝宝").unwrap());
static SENIORS_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({NUM})\s*[位个名]?\s*(?:老人|长辈|老年|父母)")).unwrap()
});
static SENIORS_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"老人|长辈|父母").unwrap());

// Destination capture runs until punctuation; these verbs end the place name
// itself ("去日本东京玩五天" -> "日本东京").
const DESTINATION_STOP_WORDS: [&str; 5] = ["玩", "旅游", "旅行", "看看", "吧"];

// Evaluated top to bottom, first match wins. Foreign currencies come before
// CNY so that amount units (万/千) never shadow an explicit currency word.
static CURRENCY_RULES: Lazy<Vec<(Currency, Regex)>> = Lazy::new(|| {
    vec![
        (Currency::USD, Regex::new(r"(?i)美元|美金|USD").unwrap()),
        (Currency::JPY, Regex::new(r"(?i)日元|JPY").unwrap()),
        (Currency::EUR, Regex::new(r"(?i)欧元|EUR").unwrap()),
        (Currency::HKD, Regex::new(r"(?i)港币|港元|HKD").unwrap()),
        (Currency::CNY, Regex::new(r"元|人民币|块钱|块|万|千").unwrap()),
    ]
});

// Fixed keyword -> theme table, evaluated in order; every matching row
// contributes its theme.
static THEME_RULES: Lazy<Vec<(Regex, Theme)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"美食|吃|餐").unwrap(), Theme::Culinary),
        (Regex::new(r"亲子|孩子|儿童|家庭").unwrap(), Theme::Family),
        (Regex::new(r"文化|历史|博物馆|艺术").unwrap(), Theme::Culture),
        (Regex::new(r"自然|户外|海滩|徒步|山").unwrap(), Theme::Nature),
        (Regex::new(r"冒险|刺激|极限").unwrap(), Theme::Adventure),
        (Regex::new(r"(?i)放松|度假|休闲|spa").unwrap(), Theme::Relaxation),
        (Regex::new(r"购物|买买买|商场|买东西").unwrap(), Theme::Shopping),
        (
            Regex::new(r"夜生活|酒吧|夜店|晚宴|演出").unwrap(),
            Theme::Nightlife,
        ),
    ]
});

/// Rule-based intent extraction over a raw transcript. Total: every field
/// gets either a matched value or its documented default, for any input.
pub fn extract(transcript: &str) -> TripIntent {
    let start_date = default_start_date();
    let duration = fallback_duration(transcript);
    let end_date = start_date + Duration::days(duration - 1);

    TripIntent {
        destination: fallback_destination(transcript),
        start_date,
        end_date,
        budget: fallback_budget(transcript),
        currency: infer_currency(transcript),
        travelers: Travelers {
            adults: fallback_adults(transcript),
            children: fallback_children(transcript),
            seniors: fallback_seniors(transcript),
        },
        preferences: Preferences {
            themes: fallback_themes(transcript),
        },
        notes: truncate_notes(transcript),
    }
}

/// Extraction does not infer explicit start dates from the text; every
/// heuristic intent starts 14 days out.
pub fn default_start_date() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(START_DATE_OFFSET_DAYS)
}

pub fn fallback_destination(transcript: &str) -> String {
    let Some(captures) = DESTINATION_RE.captures(transcript) else {
        return "自由行目的地".to_string();
    };
    let mut place = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    for stop in DESTINATION_STOP_WORDS {
        if let Some(index) = place.find(stop) {
            place = &place[..index];
        }
    }
    let place = place.trim();
    if place.is_empty() {
        "自由行".to_string()
    } else {
        place.to_string()
    }
}

/// Clamped to 2..=99 days; the cap keeps the later `start_date + days`
/// arithmetic inside chrono's representable range for any input.
pub fn fallback_duration(transcript: &str) -> i64 {
    DURATION_RE
        .captures(transcript)
        .and_then(|captures| parse_amount(&captures[1]))
        .map(|days| (days as i64).clamp(MIN_DURATION_DAYS, MAX_DURATION_DAYS))
        .unwrap_or(DEFAULT_DURATION_DAYS)
}

pub fn fallback_budget(transcript: &str) -> f64 {
    let Some(captures) = BUDGET_RE.captures(transcript) else {
        return DEFAULT_BUDGET;
    };
    let Some(amount) = parse_amount(&captures[1]) else {
        return DEFAULT_BUDGET;
    };
    let multiplier = match &captures[2] {
        "万" => 10_000.0,
        "千" => 1_000.0,
        _ => 1.0,
    };
    amount * multiplier
}

pub fn infer_currency(transcript: &str) -> Currency {
    for (currency, pattern) in CURRENCY_RULES.iter() {
        if pattern.is_match(transcript) {
            return *currency;
        }
    }
    Currency::CNY
}

pub fn fallback_adults(transcript: &str) -> u32 {
    if SOLO_RE.is_match(transcript) {
        return 1;
    }
    if let Some(count) = ADULTS_RE
        .captures(transcript)
        .and_then(|captures| parse_amount(&captures[1]))
    {
        return (count as u32).max(1);
    }
    if COUPLE_RE.is_match(transcript) {
        return 2;
    }
    2
}

pub fn fallback_children(transcript: &str) -> u32 {
    if let Some(count) = CHILDREN_COUNT_RE
        .captures(transcript)
        .and_then(|captures| parse_amount(&captures[1]))
    {
        return count as u32;
    }
    if CHILDREN_HINT_RE.is_match(transcript) {
        1
    } else {
        0
    }
}

pub fn fallback_seniors(transcript: &str) -> u32 {
    if let Some(count) = SENIORS_COUNT_RE
        .captures(transcript)
        .and_then(|captures| parse_amount(&captures[1]))
    {
        return count as u32;
    }
    // A bare mention of parents/elders usually means both of them.
    if SENIORS_HINT_RE.is_match(transcript) {
        2
    } else {
        0
    }
}

pub fn fallback_themes(transcript: &str) -> Vec<Theme> {
    let themes: Vec<Theme> = THEME_RULES
        .iter()
        .filter(|(pattern, _)| pattern.is_match(transcript))
        .map(|(_, theme)| *theme)
        .collect();
    if themes.is_empty() {
        vec![Theme::Culture, Theme::Culinary]
    } else {
        themes
    }
}

pub fn truncate_notes(transcript: &str) -> String {
    transcript.chars().take(MAX_NOTES_CHARS).collect()
}

/// Parse an Arabic or simple Chinese numeral ("3", "三", "两", "二十一",
/// "三百五十"). Returns None for anything it does not understand.
pub fn parse_amount(raw: &str) -> Option<f64> {
    if let Ok(value) = raw.parse::<f64>() {
        return Some(value);
    }
    parse_chinese_numeral(raw)
}

fn parse_chinese_numeral(raw: &str) -> Option<f64> {
    let mut total = 0u64;
    let mut pending = 0u64;
    let mut seen = false;

    for ch in raw.chars() {
        match ch {
            '一' => pending = 1,
            '二' | '两' => pending = 2,
            '三' => pending = 3,
            '四' => pending = 4,
            '五' => pending = 5,
            '六' => pending = 6,
            '七' => pending = 7,
            '八' => pending = 8,
            '九' => pending = 9,
            '十' => {
                total += if pending == 0 { 1 } else { pending } * 10;
                pending = 0;
            }
            '百' => {
                total += if pending == 0 { 1 } else { pending } * 100;
                pending = 0;
            }
            _ => return None,
        }
        seen = true;
    }

    if seen {
        Some((total + pending) as f64)
    } else {
        None
    }
}
