mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path as AxumPath, State};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use voyage_agents::PlannerAgent;
use voyage_core::TripIntent;
use voyage_model::{DashScopeClient, DashScopeConfig};
use voyage_observability::AppMetrics;
use voyage_storage::{PlanRepository, Store};

use crate::rate_limit::IpRateLimiter;

const MIN_TRANSCRIPT_CHARS: usize = 4;
const MAX_PLAN_NAME_LEN: usize = 120;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<PlannerAgent>,
    pub store: Arc<Store>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: voyage_observability::MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    dashscope: bool,
    persistence: &'static str,
}

pub async fn build_app() -> Result<Router> {
    let metrics = AppMetrics::shared();

    let model = match DashScopeConfig::from_env() {
        Some(config) => Some(Arc::new(DashScopeClient::new(config)?)),
        None => None,
    };

    let store = if let Ok(database_url) = env::var("VOYAGE_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    let agent = Arc::new(PlannerAgent::new(model, metrics.clone()));

    let api_key = env::var("VOYAGE_API_KEY").unwrap_or_else(|_| "dev-voyage-key".to_string());
    let rate_limit_window = Duration::from_secs(
        env::var("VOYAGE_API_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("VOYAGE_API_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);

    let state = ApiState {
        agent,
        store: Arc::new(store),
        metrics,
        api_key,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/intent/parse", post(intent_parse))
        .route("/v1/plan/generate", post(plan_generate))
        .route("/v1/plans", get(plans_list).post(plan_save))
        .route("/v1/plans/:id", get(plan_get).delete(plan_delete))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            dashscope: state.agent.model_configured(),
            persistence: match state.store.as_ref() {
                Store::Sqlite(_) => "sqlite",
                Store::Memory(_) => "memory",
            },
        },
    };
    (StatusCode::OK, Json(payload))
}

#[derive(Debug, Deserialize)]
struct IntentParseRequest {
    transcript: String,
}

async fn intent_parse(
    State(state): State<ApiState>,
    payload: Result<Json<IntentParseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection),
    };

    let transcript = request.transcript.trim();
    if transcript.chars().count() < MIN_TRANSCRIPT_CHARS {
        return client_error(
            StatusCode::BAD_REQUEST,
            "invalid_transcript",
            "请输入至少 4 个字符的旅行需求描述。",
        );
    }

    let outcome = state.agent.parse_intent(transcript).await;
    (StatusCode::OK, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
struct PlanGenerateRequest {
    intent: TripIntent,
}

async fn plan_generate(
    State(state): State<ApiState>,
    payload: Result<Json<PlanGenerateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection),
    };

    let outcome = state.agent.generate_plan(&request.intent).await;
    (StatusCode::OK, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
struct PlanSaveRequest {
    name: String,
    plan: voyage_core::TripPlan,
}

#[derive(Debug, Serialize)]
struct PlanSaveResponse {
    id: String,
}

async fn plan_save(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<PlanSaveRequest>, JsonRejection>,
) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return missing_owner_response();
    };
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection),
    };

    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > MAX_PLAN_NAME_LEN {
        return client_error(
            StatusCode::BAD_REQUEST,
            "invalid_name",
            "plan name must be between 1 and 120 characters",
        );
    }

    match state.store.save_plan(name, &request.plan, &owner).await {
        Ok(id) => {
            state.metrics.inc_plan_saved();
            (StatusCode::CREATED, Json(PlanSaveResponse { id })).into_response()
        }
        Err(error) => internal_error("failed to save plan", error),
    }
}

async fn plans_list(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return missing_owner_response();
    };

    match state.store.list_plans(&owner).await {
        Ok(plans) => (StatusCode::OK, Json(serde_json::json!({ "plans": plans }))).into_response(),
        Err(error) => internal_error("failed to list plans", error),
    }
}

async fn plan_get(
    State(state): State<ApiState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return missing_owner_response();
    };

    match state.store.get_plan(&id, &owner).await {
        Ok(Some(saved)) => (StatusCode::OK, Json(saved)).into_response(),
        Ok(None) => plan_not_found(),
        Err(error) => internal_error("failed to load plan", error),
    }
}

async fn plan_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return missing_owner_response();
    };

    match state.store.delete_plan(&id, &owner).await {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({ "deleted": true }))).into_response(),
        Ok(false) => plan_not_found(),
        Err(error) => internal_error("failed to delete plan", error),
    }
}

fn owner_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn missing_owner_response() -> Response {
    client_error(
        StatusCode::UNAUTHORIZED,
        "missing_user",
        "x-user-id header is required for saved plans",
    )
}

fn plan_not_found() -> Response {
    client_error(
        StatusCode::NOT_FOUND,
        "plan_not_found",
        "no plan with this id belongs to the caller",
    )
}

fn invalid_body(rejection: JsonRejection) -> Response {
    client_error(
        StatusCode::BAD_REQUEST,
        "invalid_request",
        &rejection.body_text(),
    )
}

fn client_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

fn internal_error(message: &str, error: anyhow::Error) -> Response {
    tracing::error!(%error, "{message}");
    client_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}

// The browser client authenticates with the x-api-key header, so credentials
// stay out of the CORS exchange and a wildcard origin is sufficient.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn is_public_endpoint(path: &str) -> bool {
    path == "/health"
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return client_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid x-api-key",
        );
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return client_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this IP",
        );
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}
