use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use voyage_core::{
    build_mock_plan, extract, sanitize_intent, sanitize_plan, IntentProvider, PlanProvider,
    TripIntent, TripPlan,
};
use voyage_model::{ChatOptions, DashScopeClient};
use voyage_observability::AppMetrics;

const INTENT_SYSTEM_PROMPT: &str =
    "你是一名旅行助理，请严格返回 JSON，不要输出多余解释。确保字段完整。";
const PLAN_SYSTEM_PROMPT: &str =
    "你是一名经验丰富的中文旅行规划 AI，请用 JSON 结构输出完整旅行方案，字段需与示例一致，不要输出多余解释。";

const HEURISTIC_NOTICE: &str = "未配置 DashScope，已使用规则解析。";
const FALLBACK_NOTICE: &str = "通义千问解析失败，已使用规则解析。";

const INTENT_TEMPERATURE: f64 = 0.2;
const PLAN_TEMPERATURE: f64 = 0.6;
const PLAN_TOP_P: f64 = 0.8;

#[derive(Debug, Clone, Serialize)]
pub struct IntentOutcome {
    pub intent: TripIntent,
    pub provider: IntentProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub plan: TripPlan,
    pub provider: PlanProvider,
}

/// Orchestrates the two model-backed stages: transcript to intent and intent
/// to plan. The model client is optional; without one, or on any model
/// failure, both stages degrade to their deterministic local counterparts so
/// a caller always gets a usable result.
#[derive(Clone)]
pub struct PlannerAgent {
    model: Option<Arc<DashScopeClient>>,
    metrics: Arc<AppMetrics>,
}

impl PlannerAgent {
    pub fn new(model: Option<Arc<DashScopeClient>>, metrics: Arc<AppMetrics>) -> Self {
        Self { model, metrics }
    }

    pub fn model_configured(&self) -> bool {
        self.model.is_some()
    }

    #[instrument(skip(self, transcript))]
    pub async fn parse_intent(&self, transcript: &str) -> IntentOutcome {
        let started = Instant::now();
        self.metrics.inc_request();

        let Some(client) = self.model.as_ref() else {
            self.metrics.observe_latency(started.elapsed());
            return IntentOutcome {
                intent: extract(transcript),
                provider: IntentProvider::Heuristic,
                message: Some(HEURISTIC_NOTICE.to_string()),
            };
        };

        self.metrics.inc_model_call();
        let options = ChatOptions {
            temperature: INTENT_TEMPERATURE,
            ..ChatOptions::default()
        };
        let outcome = match client
            .chat_complete(INTENT_SYSTEM_PROMPT, &intent_prompt(transcript), &options)
            .await
        {
            Ok(raw) if !raw.trim().is_empty() => {
                let intent = sanitize_intent(&raw, transcript);
                info!(destination = %intent.destination, "intent parsed via dashscope");
                IntentOutcome {
                    intent,
                    provider: IntentProvider::Dashscope,
                    message: None,
                }
            }
            Ok(_) => {
                warn!("dashscope intent response was empty, falling back to rules");
                self.heuristic_intent(transcript)
            }
            Err(error) => {
                warn!(%error, "dashscope intent call failed, falling back to rules");
                self.heuristic_intent(transcript)
            }
        };

        self.metrics.observe_latency(started.elapsed());
        outcome
    }

    #[instrument(skip(self, intent), fields(destination = %intent.destination))]
    pub async fn generate_plan(&self, intent: &TripIntent) -> PlanOutcome {
        let started = Instant::now();
        self.metrics.inc_request();

        let Some(client) = self.model.as_ref() else {
            self.metrics.observe_latency(started.elapsed());
            return PlanOutcome {
                plan: build_mock_plan(intent),
                provider: PlanProvider::Mock,
            };
        };

        self.metrics.inc_model_call();
        let options = ChatOptions {
            temperature: PLAN_TEMPERATURE,
            top_p: Some(PLAN_TOP_P),
            model: None,
        };
        let outcome = match client
            .chat_complete(PLAN_SYSTEM_PROMPT, &plan_prompt(intent), &options)
            .await
        {
            Ok(raw) if !raw.trim().is_empty() => {
                let plan = sanitize_plan(&raw, intent);
                info!(plan_id = %plan.id, days = plan.itinerary.len(), "plan generated via dashscope");
                PlanOutcome {
                    plan,
                    provider: PlanProvider::Dashscope,
                }
            }
            Ok(_) => {
                warn!("dashscope plan response was empty, falling back to template");
                self.mock_plan(intent)
            }
            Err(error) => {
                warn!(%error, "dashscope plan call failed, falling back to template");
                self.mock_plan(intent)
            }
        };

        self.metrics.observe_latency(started.elapsed());
        outcome
    }

    fn heuristic_intent(&self, transcript: &str) -> IntentOutcome {
        self.metrics.inc_fallback();
        IntentOutcome {
            intent: extract(transcript),
            provider: IntentProvider::Heuristic,
            message: Some(FALLBACK_NOTICE.to_string()),
        }
    }

    fn mock_plan(&self, intent: &TripIntent) -> PlanOutcome {
        self.metrics.inc_fallback();
        PlanOutcome {
            plan: build_mock_plan(intent),
            provider: PlanProvider::Mock,
        }
    }
}

fn intent_prompt(transcript: &str) -> String {
    let sanitized = transcript.replace('"', "\\\"");
    format!(
        r#"请将以下中文旅行需求解析为 JSON，字段需全部填写：
输入: "{sanitized}"
输出格式：
{{
  "destination": string,
  "startDate": "YYYY-MM-DD",
  "endDate": "YYYY-MM-DD",
  "budget": number,
  "currency": "CNY" | "USD" | "JPY" | "EUR" | "HKD",
  "travelers": {{ "adults": number, "children": number, "seniors": number }},
  "preferences": {{ "themes": string[] }},
  "notes": string
}}

若原文未提供日期，请选择距离今天 14 天后的日期作为开始，行程天数由用户描述确定，若未说明则取 5 天。
预算若出现“万元”等描述，请换算为具体数字。"#
    )
}

fn plan_prompt(intent: &TripIntent) -> String {
    let themes = intent
        .preferences
        .themes
        .iter()
        .map(|theme| theme.as_code())
        .collect::<Vec<_>>()
        .join(", ");
    let themes = if themes.is_empty() {
        "无特别偏好".to_string()
    } else {
        themes
    };
    let notes = if intent.notes.is_empty() {
        "无"
    } else {
        intent.notes.as_str()
    };

    format!(
        r#"你是一名专业的中文旅行规划 AI 助理。请根据以下信息生成结构化 JSON 行程：

目的地: {destination}
出发日期: {start}
结束日期: {end}
预算: {budget} {currency}
同行人数: 成人 {adults} 人，儿童 {children} 人，老人 {seniors} 人
旅行偏好: {themes}
补充说明: {notes}

请返回 JSON，字段包含：
{{
  "title": string,
  "highlights": string[],
  "budget": {{ "currency": string, "total": number, "transportation": number, "lodging": number, "activities": number, "dining": number, "contingency": number }},
  "itinerary": [
    {{
      "date": "YYYY-MM-DD",
      "summary": string,
      "items": [
        {{ "title": string, "description": string, "startTime": string, "endTime": string, "location": {{ "name": string, "address": string }}, "estimatedCost": number, "tags": string[] }}
      ]
    }}
  ]
}}

确保返回可被 JSON 解析，不要包含额外解释。"#,
        destination = intent.destination,
        start = intent.start_date,
        end = intent.end_date,
        budget = intent.budget,
        currency = intent.currency.as_code(),
        adults = intent.travelers.adults,
        children = intent.travelers.children,
        seniors = intent.travelers.seniors,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use voyage_model::DashScopeConfig;

    fn agent_without_model() -> PlannerAgent {
        PlannerAgent::new(None, AppMetrics::shared())
    }

    // Port 9 (discard) refuses connections, so every model call fails at the
    // transport layer.
    fn agent_with_unreachable_model() -> PlannerAgent {
        let client = DashScopeClient::new(DashScopeConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "qwen-plus".to_string(),
        })
        .unwrap();
        PlannerAgent::new(Some(Arc::new(client)), AppMetrics::shared())
    }

    #[tokio::test]
    async fn missing_model_parses_with_rules_and_says_so() {
        let agent = agent_without_model();
        let outcome = agent.parse_intent("我们一家四口想去东京玩5天").await;

        assert_eq!(outcome.provider, IntentProvider::Heuristic);
        assert_eq!(outcome.intent.destination, "东京");
        assert_eq!(outcome.message.as_deref(), Some(HEURISTIC_NOTICE));
    }

    #[tokio::test]
    async fn missing_model_generates_template_plan() {
        let agent = agent_without_model();
        let intent = extract("预算一万元去大阪玩三天");
        let outcome = agent.generate_plan(&intent).await;

        assert_eq!(outcome.provider, PlanProvider::Mock);
        assert_eq!(outcome.plan.itinerary.len() as i64, intent.duration_days());
        assert!(outcome.plan.id.starts_with("mock-"));
    }

    #[tokio::test]
    async fn model_failure_parses_with_rules_and_says_so() {
        let agent = agent_with_unreachable_model();
        let outcome = agent.parse_intent("一个人去巴黎玩三天").await;

        assert_eq!(outcome.provider, IntentProvider::Heuristic);
        assert_eq!(outcome.message.as_deref(), Some(FALLBACK_NOTICE));
        assert_eq!(outcome.intent.travelers.adults, 1);
        assert_eq!(outcome.intent.duration_days(), 3);
        assert!(!outcome.intent.destination.is_empty());
    }

    #[tokio::test]
    async fn model_failure_generates_template_plan() {
        let agent = agent_with_unreachable_model();
        let intent = extract("预算一万元去大阪玩三天");
        let outcome = agent.generate_plan(&intent).await;

        assert_eq!(outcome.provider, PlanProvider::Mock);
        assert_eq!(outcome.plan.itinerary.len() as i64, intent.duration_days());
        assert!(outcome.plan.id.starts_with("mock-"));
    }

    #[test]
    fn plan_prompt_carries_intent_fields() {
        let intent = extract("情侣去巴黎玩四天，喜欢美食和购物");
        let prompt = plan_prompt(&intent);

        assert!(prompt.contains("巴黎"));
        assert!(prompt.contains("culinary"));
        assert!(prompt.contains("shopping"));
        assert!(prompt.contains("成人 2 人"));
    }

    #[test]
    fn intent_prompt_escapes_quotes() {
        let prompt = intent_prompt("去\"东京\"玩");
        assert!(prompt.contains("\\\"东京\\\""));
    }
}
