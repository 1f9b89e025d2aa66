use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::latency::{LatencySnapshot, LatencyStats};
use crate::api::{core_agents, health, leads, ApiResponse};
use crate::db::models::CalculatorResultRow;
use crate::db::{DbWriter, LeadStore, ResponseCache};
use crate::error::AppError;
use crate::fallback::DegradedMode;
use crate::fetcher::CoreAgentsClient;
use crate::roi::{self, RoiInputs, RoiReport};

/// Everything a handler may touch. Built once in `main` and cloned per
/// request; the heavy members sit behind `Arc` or are pool handles.
#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub cache: ResponseCache,
    pub writer: DbWriter,
    pub leads: LeadStore,
    pub core_agents: Arc<CoreAgentsClient>,
    pub degraded: Arc<DegradedMode>,
    pub latency: Arc<LatencyStats>,
    /// TTL for responses served through the generic proxy.
    pub proxy_ttl: Duration,
}

impl ApiState {
    pub fn new(
        pool: SqlitePool,
        core_agents: Arc<CoreAgentsClient>,
        latency: Arc<LatencyStats>,
        proxy_ttl: Duration,
    ) -> Self {
        Self {
            cache: ResponseCache::new(pool.clone()),
            writer: DbWriter::new(pool.clone()),
            leads: LeadStore::new(pool.clone()),
            pool,
            core_agents,
            degraded: Arc::new(DegradedMode::houston()),
            latency,
            proxy_ttl,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::get_health))
        .route("/api/core-agents", post(core_agents::proxy))
        .route("/api/core-agents/market-timing", get(core_agents::get_market_timing))
        .route("/api/core-agents/market-timing/score", post(core_agents::score_indicators))
        .route("/api/core-agents/market-timing/history", get(core_agents::get_market_timing_history))
        .route("/api/core-agents/market-intelligence", get(core_agents::get_market_intelligence))
        .route("/api/core-agents/neighborhood-comparison", get(core_agents::get_neighborhood_comparison))
        .route("/api/tools/roi-calculator", post(calculate_roi))
        .route("/api/tools/roi-calculator/:id", get(get_calculator_result))
        .route("/api/leads", get(leads::list_leads).post(leads::submit_lead))
        .route(
            "/api/leads/:id",
            get(leads::get_lead).patch(leads::update_lead).delete(leads::delete_lead),
        )
        .route("/api/leads/:id/score", post(leads::rescore_lead))
        .route("/api/admin/cache", delete(purge_cache))
        .route("/stats/latency", get(get_stats_latency))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn calculate_roi(
    State(state): State<ApiState>,
    body: Result<Json<RoiInputs>, JsonRejection>,
) -> Result<Json<ApiResponse<RoiReport>>, AppError> {
    let Json(inputs) = body?;
    let report = roi::calculate(&state.core_agents, &state.writer, &state.leads, &inputs).await?;
    Ok(ApiResponse::ok(report))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorResultResponse {
    pub id: String,
    pub lead_id: Option<String>,
    pub session_id: Option<String>,
    pub calculator_type: String,
    pub inputs: Value,
    pub roi: f64,
    pub total_cost: f64,
    pub projected_profit: f64,
    pub timeline: String,
    pub risks: Value,
    pub created_at: i64,
}

impl From<CalculatorResultRow> for CalculatorResultResponse {
    fn from(r: CalculatorResultRow) -> Self {
        Self {
            id: r.id,
            lead_id: r.lead_id,
            session_id: r.session_id,
            calculator_type: r.calculator_type,
            inputs: serde_json::from_str(&r.inputs).unwrap_or(Value::Null),
            roi: r.roi,
            total_cost: r.total_cost,
            projected_profit: r.projected_profit,
            timeline: r.timeline,
            risks: serde_json::from_str(&r.risks).unwrap_or(Value::Null),
            created_at: r.created_at,
        }
    }
}

async fn get_calculator_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CalculatorResultResponse>>, AppError> {
    let row = state
        .writer
        .calculator_result(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Calculator result".to_string()))?;
    Ok(ApiResponse::ok(row.into()))
}

#[derive(Deserialize)]
pub struct PurgeQuery {
    /// Drop this one entry, fresh or not, instead of sweeping expired rows.
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub removed: u64,
}

async fn purge_cache(
    State(state): State<ApiState>,
    params: Result<Query<PurgeQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<PurgeResponse>>, AppError> {
    let Query(params) = params?;
    let removed = match params.key.as_deref() {
        Some(key) => u64::from(state.cache.invalidate(key).await?),
        None => state.cache.purge_expired().await?,
    };
    info!(removed, key = params.key.as_deref(), "purged cache rows");
    Ok(ApiResponse::ok(PurgeResponse { removed }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<ApiResponse<LatencySnapshot>> {
    ApiResponse::ok(state.latency.snapshot())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{memory_pool, now_ms};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use httpmock::prelude::*;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// State wired to an in-memory database and a mock upstream.
    pub(crate) async fn test_state(server: &MockServer) -> ApiState {
        let latency = Arc::new(LatencyStats::new());
        let client = CoreAgentsClient::new(server.base_url(), "test-secret", Duration::from_secs(5), Arc::clone(&latency))
            .expect("client builds");
        ApiState::new(memory_pool().await, Arc::new(client), latency, Duration::from_secs(3600))
    }

    pub(crate) async fn send(state: &ApiState, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn roi_body() -> Value {
        json!({
            "purchasePrice": 350000,
            "renovationCost": 45000,
            "holdingPeriod": 12,
            "propertyType": "townhome",
            "location": "Pearland",
            "squareFeet": 1800
        })
    }

    #[tokio::test]
    async fn roi_calculator_returns_projection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/tools/roi-calculator")
                    .json_body_partial(r#"{"additionalFactors":{"holdingPeriod":12.0,"squareFeet":1800.0}}"#);
                then.status(200).json_body(json!({
                    "result": {
                        "totalCost": 395000,
                        "projectedProfit": 60000,
                        "roi": 15.2,
                        "timeline": "12 months",
                        "risks": []
                    }
                }));
            })
            .await;
        let state = test_state(&server).await;

        let (status, body) = send(&state, post_json("/api/tools/roi-calculator", &roi_body())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["roi"], 15.2);
        assert_eq!(body["data"]["timeline"], "12 months");
        assert!(body["data"]["calculatorResultId"].is_string());
    }

    #[tokio::test]
    async fn roi_calculator_upstream_failure_is_503() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(500).body("boom");
            })
            .await;
        let state = test_state(&server).await;

        let (status, body) = send(&state, post_json("/api/tools/roi-calculator", &roi_body())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn roi_calculator_rejects_bad_input() {
        let server = MockServer::start_async().await;
        let state = test_state(&server).await;

        let mut bad = roi_body();
        bad["purchasePrice"] = json!(-1);
        let (status, body) = send(&state, post_json("/api/tools/roi-calculator", &bad)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "purchasePrice");
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let server = MockServer::start_async().await;
        let state = test_state(&server).await;

        let req = Request::builder()
            .method("POST")
            .uri("/api/tools/roi-calculator")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&state, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "body");
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let server = MockServer::start_async().await;
        let state = test_state(&server).await;
        state.cache.store("stale", &json!({}), now_ms() - 10).await.unwrap();
        state.cache.store("fresh", &json!({}), now_ms() + 60_000).await.unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/admin/cache")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], 1);
    }

    #[tokio::test]
    async fn purge_by_key_drops_a_fresh_entry() {
        let server = MockServer::start_async().await;
        let state = test_state(&server).await;
        state.cache.store("demographics:{}", &json!({}), now_ms() + 60_000).await.unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/admin/cache?key=demographics:%7B%7D")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], 1);
    }

    #[tokio::test]
    async fn stored_calculator_result_can_be_fetched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(200).json_body(json!({
                    "result": {"totalCost": 395000, "projectedProfit": 60000, "roi": 15.2, "risks": ["Permit delays"]}
                }));
            })
            .await;
        let state = test_state(&server).await;

        let (_, created) = send(&state, post_json("/api/tools/roi-calculator", &roi_body())).await;
        let id = created["data"]["calculatorResultId"].as_str().unwrap().to_string();

        let (status, body) = send(&state, get(&format!("/api/tools/roi-calculator/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["calculatorType"], "roi");
        assert_eq!(body["data"]["timeline"], "12 months");
        assert_eq!(body["data"]["inputs"]["location"], "Pearland");
        assert_eq!(body["data"]["risks"][0]["category"], "general");

        let (status, _) = send(&state, get("/api/tools/roi-calculator/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn latency_stats_reflect_upstream_calls() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/intelligence/market-timing");
                then.status(200).json_body(json!({}));
            })
            .await;
        let state = test_state(&server).await;

        let (_, before) = send(&state, get("/stats/latency")).await;
        assert_eq!(before["data"]["samples"], 0);
        assert!(before["data"]["p50_ms"].is_null());

        send(&state, get("/api/core-agents/market-timing")).await;
        let (_, after) = send(&state, get("/stats/latency")).await;
        assert_eq!(after["data"]["samples"], 1);
        assert!(after["data"]["p99_ms"].is_number());
    }
}
