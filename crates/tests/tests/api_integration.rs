use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use voyage_api::build_app;

const API_KEY: &str = "dev-voyage-key";

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let parsed = body_json(response).await;
    assert_eq!(parsed["status"], "ok");
    assert!(parsed.get("metrics").is_some());
}

#[tokio::test]
async fn intent_parse_requires_api_key() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/intent/parse")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "transcript": "我们一家四口想去东京玩5天" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let parsed = body_json(response).await;
    assert_eq!(parsed["error"], "unauthorized");
}

#[tokio::test]
async fn intent_parse_extracts_family_trip() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/intent/parse")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(
            json!({
                "transcript": "我们一家四口想去东京玩5天，预算两万元，喜欢美食和动漫，带两个孩子"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = body_json(response).await;
    // without DASHSCOPE_API_KEY the service answers from the rule engine
    assert_eq!(parsed["provider"], "heuristic");
    assert_eq!(parsed["intent"]["destination"], "东京");
    assert_eq!(parsed["intent"]["budget"], 20000.0);
    assert_eq!(parsed["intent"]["currency"], "CNY");
    assert_eq!(parsed["intent"]["travelers"]["children"], 2);
    assert!(parsed["message"].is_string());
}

#[tokio::test]
async fn short_transcript_is_rejected() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/intent/parse")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "transcript": " 去 " }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let parsed = body_json(response).await;
    assert_eq!(parsed["error"], "invalid_transcript");
}

#[tokio::test]
async fn preflight_requests_are_answered_with_cors_headers() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/intent/parse")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,x-api-key")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn malformed_plan_request_gets_structured_error() {
    let app = build_app().await.expect("app should build");

    // body lacks the required `intent` field
    let request = Request::builder()
        .method("POST")
        .uri("/v1/plan/generate")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let parsed = body_json(response).await;
    assert_eq!(parsed["error"], "invalid_request");
    assert!(parsed["message"].is_string());
}

#[tokio::test]
async fn plan_generate_covers_every_day_and_splits_budget() {
    let app = build_app().await.expect("app should build");

    let intent = json!({
        "destination": "杭州",
        "startDate": "2026-10-01",
        "endDate": "2026-10-03",
        "budget": 10000.0,
        "currency": "CNY",
        "travelers": { "adults": 2, "children": 0, "seniors": 0 },
        "preferences": { "themes": ["nature"] },
        "notes": "希望行程轻松"
    });

    let request = Request::builder()
        .method("POST")
        .uri("/v1/plan/generate")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "intent": intent }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = body_json(response).await;
    assert_eq!(parsed["provider"], "mock");
    assert_eq!(parsed["plan"]["durationDays"], 3);
    assert_eq!(parsed["plan"]["itinerary"].as_array().unwrap().len(), 3);
    assert_eq!(parsed["plan"]["itinerary"][0]["date"], "2026-10-01");
    assert_eq!(parsed["plan"]["budget"]["total"], 10000.0);
    assert_eq!(parsed["plan"]["budget"]["transportation"], 2500.0);
    assert_eq!(parsed["plan"]["budget"]["lodging"], 3000.0);
    assert_eq!(parsed["plan"]["budget"]["contingency"], 500.0);
}

#[tokio::test]
async fn saved_plans_are_scoped_to_their_owner() {
    let app = build_app().await.expect("app should build");

    let plan_request = Request::builder()
        .method("POST")
        .uri("/v1/plan/generate")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(
            json!({
                "intent": {
                    "destination": "巴黎",
                    "startDate": "2026-09-20",
                    "endDate": "2026-09-22",
                    "budget": 30000.0,
                    "currency": "CNY",
                    "travelers": { "adults": 2, "children": 0, "seniors": 0 },
                    "preferences": { "themes": ["culture"] },
                    "notes": ""
                }
            })
            .to_string(),
        ))
        .unwrap();

    let plan_response = app.clone().oneshot(plan_request).await.unwrap();
    assert_eq!(plan_response.status(), StatusCode::OK);
    let plan = body_json(plan_response).await["plan"].clone();

    let save_request = Request::builder()
        .method("POST")
        .uri("/v1/plans")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .header("x-user-id", "user-a")
        .body(Body::from(json!({ "name": "巴黎之行", "plan": plan }).to_string()))
        .unwrap();

    let save_response = app.clone().oneshot(save_request).await.unwrap();
    assert_eq!(save_response.status(), StatusCode::CREATED);
    let id = body_json(save_response).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let list_request = Request::builder()
        .uri("/v1/plans")
        .header("x-api-key", API_KEY)
        .header("x-user-id", "user-a")
        .body(Body::empty())
        .unwrap();
    let list_response = app.clone().oneshot(list_request).await.unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let listed = body_json(list_response).await;
    assert_eq!(listed["plans"].as_array().unwrap().len(), 1);
    assert_eq!(listed["plans"][0]["name"], "巴黎之行");

    // a different owner cannot see or delete the plan
    let foreign_get = Request::builder()
        .uri(format!("/v1/plans/{id}"))
        .header("x-api-key", API_KEY)
        .header("x-user-id", "user-b")
        .body(Body::empty())
        .unwrap();
    let foreign_response = app.clone().oneshot(foreign_get).await.unwrap();
    assert_eq!(foreign_response.status(), StatusCode::NOT_FOUND);

    let delete_request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/plans/{id}"))
        .header("x-api-key", API_KEY)
        .header("x-user-id", "user-a")
        .body(Body::empty())
        .unwrap();
    let delete_response = app.clone().oneshot(delete_request).await.unwrap();
    assert_eq!(delete_response.status(), StatusCode::OK);

    let gone_request = Request::builder()
        .uri(format!("/v1/plans/{id}"))
        .header("x-api-key", API_KEY)
        .header("x-user-id", "user-a")
        .body(Body::empty())
        .unwrap();
    let gone_response = app.oneshot(gone_request).await.unwrap();
    assert_eq!(gone_response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn saved_plans_require_owner_header() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .uri("/v1/plans")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let parsed = body_json(response).await;
    assert_eq!(parsed["error"], "missing_user");
}
