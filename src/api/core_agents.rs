//! Market-intelligence endpoints backed by the Core Agents API.
//!
//! Timing, intelligence and neighborhood reads fall back to the degraded-mode
//! table when the upstream fails. The generic proxy and the ROI calculator
//! do not: their failures surface as 503.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{ApiResponse, ApiState};
use crate::config::MARKET_INTEL_CACHE_TTL;
use crate::db::cache::cache_key;
use crate::db::Cached;
use crate::error::{AppError, FieldError, Result};
use crate::fallback;
use crate::fetcher::{
    CoreAgentsClient, DemographicsQuery, LocationQuery, MarketIntelligenceFeed, MarketIntelligenceQuery,
    MarketTrendsQuery, NeighborhoodFeed, NeighborhoodQuery, PermitQuery, PropertyAnalysisQuery,
};
use crate::roi::RoiInputs;
use crate::scorer::score_market_timing;
use crate::types::{
    ComparisonLeaders, CurrentMetrics, DataSource, MarketIndicators, MarketIntelligenceReport, MarketTimingReport,
    NeighborhoodComparison, NeighborhoodSnapshot, ResolvedIndicators, ScoreResult,
};
use crate::validation::{FieldErrors, Validate};

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// Market timing
// ---------------------------------------------------------------------------

pub async fn get_market_timing(State(state): State<ApiState>) -> Json<ApiResponse<MarketTimingReport>> {
    let report = match state.core_agents.market_timing(&LocationQuery::houston()).await {
        Ok(feed) => {
            let indicators = feed.indicators().resolve();
            MarketTimingReport::new(indicators, score_market_timing(&indicators), DataSource::Live, timestamp())
        }
        Err(e) => {
            warn!(error = %e, "market timing unavailable, serving fallback");
            state.degraded.market_timing(timestamp())
        }
    };

    if let Err(e) = state.writer.insert_market_snapshot(&report).await {
        warn!(error = %e, "failed to record market snapshot");
    }

    ApiResponse::ok(report)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredIndicators {
    pub indicators: ResolvedIndicators,
    #[serde(flatten)]
    pub scores: ScoreResult,
    pub recommendation_message: &'static str,
}

/// Scores caller-supplied indicators without touching the upstream.
pub async fn score_indicators(
    body: std::result::Result<Json<MarketIndicators>, JsonRejection>,
) -> Result<Json<ApiResponse<ScoredIndicators>>> {
    let Json(raw) = body?;
    let indicators = raw.resolve();
    let scores = score_market_timing(&indicators);
    Ok(ApiResponse::ok(ScoredIndicators {
        indicators,
        scores,
        recommendation_message: scores.recommendation.message(),
    }))
}

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub id: i64,
    pub source: String,
    pub indicators: Value,
    pub buy_score: i64,
    pub sell_score: i64,
    pub hold_score: i64,
    pub overall_score: i64,
    pub recommendation: String,
    pub created_at: i64,
}

pub async fn get_market_timing_history(
    State(state): State<ApiState>,
    params: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<SnapshotResponse>>>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    let rows = state.writer.recent_market_snapshots(limit).await?;

    let snapshots = rows
        .into_iter()
        .map(|r| SnapshotResponse {
            id: r.id,
            source: r.source,
            indicators: serde_json::from_str(&r.indicators).unwrap_or(Value::Null),
            buy_score: r.buy_score,
            sell_score: r.sell_score,
            hold_score: r.hold_score,
            overall_score: r.overall_score,
            recommendation: r.recommendation,
            created_at: r.created_at,
        })
        .collect();

    Ok(ApiResponse::ok(snapshots))
}

// ---------------------------------------------------------------------------
// Market intelligence widget
// ---------------------------------------------------------------------------

const DEFAULT_AREA: &str = "houston";

#[derive(Debug, Deserialize)]
pub struct IntelligenceQuery {
    pub neighborhood: Option<String>,
}

pub async fn get_market_intelligence(
    State(state): State<ApiState>,
    params: std::result::Result<Query<IntelligenceQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<MarketIntelligenceReport>>> {
    let Query(params) = params?;
    let area = params
        .neighborhood
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_AREA.to_string());
    let key = cache_key("market-intelligence", &json!({ "neighborhood": fallback::slugify(&area) }))?;

    let fetched = state
        .cache
        .get_or_compute(&key, MARKET_INTEL_CACHE_TTL, || fetch_intelligence(&state, &area))
        .await;

    match fetched {
        Ok(Cached { value, cached }) => Ok(ApiResponse::with_cache_flag(value, cached)),
        Err(e) if e.is_upstream() => {
            warn!(neighborhood = %area, error = %e, "market intelligence unavailable, serving fallback");
            Ok(ApiResponse::with_cache_flag(degraded_intelligence(&state, &area), false))
        }
        Err(e) => Err(e),
    }
}

fn display_name(state: &ApiState, area: &str) -> String {
    if state.degraded.is_known_neighborhood(area) {
        state.degraded.neighborhood(area).name
    } else {
        area.to_string()
    }
}

async fn fetch_intelligence(state: &ApiState, area: &str) -> Result<MarketIntelligenceReport> {
    let mut context = serde_json::Map::new();
    context.insert("city".to_string(), json!("Houston"));
    context.insert("state".to_string(), json!("TX"));
    context.insert("neighborhood".to_string(), json!(area));
    context.insert("includeHistory".to_string(), json!(true));
    context.insert("includeTrends".to_string(), json!(true));

    let query = MarketIntelligenceQuery {
        query: format!("Current real estate market intelligence for {area}, Houston TX"),
        context: Some(context),
    };
    let feed: MarketIntelligenceFeed = state.core_agents.market_intelligence(&query).await?;

    let d = state.degraded.current_metrics();
    let current_metrics = CurrentMetrics {
        avg_price_per_sq_ft: feed.avg_price_per_sq_ft.unwrap_or(d.avg_price_per_sq_ft),
        price_change: feed.price_change.unwrap_or(d.price_change),
        days_on_market: feed.days_on_market.unwrap_or(d.days_on_market),
        dom_change: feed.dom_change.unwrap_or(d.dom_change),
        active_listings: feed.active_listings.unwrap_or(d.active_listings),
        listings_change: feed.listings_change.unwrap_or(d.listings_change),
    };

    let price_history = match feed.price_history {
        Some(history) if !history.is_empty() => history,
        _ => fallback::price_history(Utc::now().date_naive()),
    };
    let insights = match feed.insights {
        Some(insights) if !insights.is_empty() => insights,
        _ => state.degraded.insights(),
    };

    Ok(MarketIntelligenceReport {
        neighborhood: display_name(state, area),
        current_metrics,
        price_history,
        property_type_distribution: state.degraded.property_types(),
        insights,
        source: DataSource::Live,
        last_updated: timestamp(),
    })
}

fn degraded_intelligence(state: &ApiState, area: &str) -> MarketIntelligenceReport {
    MarketIntelligenceReport {
        neighborhood: display_name(state, area),
        current_metrics: state.degraded.current_metrics(),
        price_history: fallback::price_history(Utc::now().date_naive()),
        property_type_distribution: state.degraded.property_types(),
        insights: state.degraded.insights(),
        source: DataSource::Fallback,
        last_updated: timestamp(),
    }
}

// ---------------------------------------------------------------------------
// Neighborhood comparison
// ---------------------------------------------------------------------------

/// Upper bound on names per comparison; each one is an upstream call.
pub const MAX_COMPARED_NEIGHBORHOODS: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ComparisonQuery {
    /// Comma-separated neighborhood names.
    pub neighborhoods: Option<String>,
}

pub async fn get_neighborhood_comparison(
    State(state): State<ApiState>,
    params: std::result::Result<Query<ComparisonQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<NeighborhoodComparison>>> {
    let Query(params) = params?;
    let names: Vec<String> = params
        .neighborhoods
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();

    if names.len() > MAX_COMPARED_NEIGHBORHOODS {
        return Err(AppError::Validation(vec![FieldError::new(
            "neighborhoods",
            format!("at most {MAX_COMPARED_NEIGHBORHOODS} neighborhoods can be compared"),
        )]));
    }

    let snapshots = join_all(names.iter().map(|name| neighborhood_snapshot(&state, name))).await;

    let Some(comparison) = leaders(&snapshots) else {
        return Err(AppError::Validation(vec![FieldError::new(
            "neighborhoods",
            "at least one neighborhood is required",
        )]));
    };

    Ok(ApiResponse::ok(NeighborhoodComparison {
        neighborhoods: snapshots,
        comparison,
    }))
}

/// Live figures where the upstream has them, table figures for the rest.
/// The caller's spelling of the name is kept either way.
async fn neighborhood_snapshot(state: &ApiState, name: &str) -> NeighborhoodSnapshot {
    let mut base = state.degraded.neighborhood(name);
    base.name = name.to_string();

    match state.core_agents.neighborhood_data::<NeighborhoodFeed>(name).await {
        Ok(feed) => NeighborhoodSnapshot {
            avg_price_per_sq_ft: feed.avg_price_per_sq_ft.unwrap_or(base.avg_price_per_sq_ft),
            year_over_year_growth: feed.year_over_year_growth.unwrap_or(base.year_over_year_growth),
            inventory_level: feed.inventory_level.unwrap_or(base.inventory_level),
            demand_score: feed.demand_score.unwrap_or(base.demand_score),
            median_price: feed.median_price.unwrap_or(base.median_price),
            days_on_market: feed.days_on_market.unwrap_or(base.days_on_market),
            source: DataSource::Live,
            name: base.name,
        },
        Err(e) => {
            warn!(neighborhood = name, error = %e, "neighborhood data unavailable, serving fallback");
            base
        }
    }
}

/// First entry wins ties. `None` only for an empty list.
fn leaders(items: &[NeighborhoodSnapshot]) -> Option<ComparisonLeaders> {
    let top = |key: fn(&NeighborhoodSnapshot) -> f64| {
        items
            .iter()
            .reduce(|best, n| if key(n) > key(best) { n } else { best })
            .cloned()
    };
    Some(ComparisonLeaders {
        highest_price: top(|n| n.avg_price_per_sq_ft)?,
        fastest_growth: top(|n| n.year_over_year_growth)?,
        highest_demand: top(|n| n.demand_score)?,
    })
}

// ---------------------------------------------------------------------------
// Generic proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyEndpoint {
    MarketIntelligence,
    PropertyAnalysis,
    NeighborhoodData,
    PermitData,
    Demographics,
    MarketTrends,
    RoiCalculator,
}

impl ProxyEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyEndpoint::MarketIntelligence => "market-intelligence",
            ProxyEndpoint::PropertyAnalysis => "property-analysis",
            ProxyEndpoint::NeighborhoodData => "neighborhood-data",
            ProxyEndpoint::PermitData => "permit-data",
            ProxyEndpoint::Demographics => "demographics",
            ProxyEndpoint::MarketTrends => "market-trends",
            ProxyEndpoint::RoiCalculator => "roi-calculator",
        }
    }
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub endpoint: ProxyEndpoint,
    #[serde(default)]
    pub params: Value,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

/// A proxy request with its params decoded for the chosen endpoint.
#[derive(Debug)]
pub enum ProxyCall {
    MarketIntelligence(MarketIntelligenceQuery),
    PropertyAnalysis(PropertyAnalysisQuery),
    NeighborhoodData(NeighborhoodQuery),
    PermitData(PermitQuery),
    Demographics(DemographicsQuery),
    MarketTrends(MarketTrendsQuery),
    RoiCalculator(RoiInputs),
}

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| AppError::Validation(vec![FieldError::new("params", e.to_string())]))
}

impl ProxyCall {
    pub fn parse(endpoint: ProxyEndpoint, params: Value) -> Result<Self> {
        let params = if params.is_null() { json!({}) } else { params };
        let call = match endpoint {
            ProxyEndpoint::MarketIntelligence => ProxyCall::MarketIntelligence(decode(params)?),
            ProxyEndpoint::PropertyAnalysis => ProxyCall::PropertyAnalysis(decode(params)?),
            ProxyEndpoint::NeighborhoodData => ProxyCall::NeighborhoodData(decode(params)?),
            ProxyEndpoint::PermitData => ProxyCall::PermitData(decode(params)?),
            ProxyEndpoint::Demographics => ProxyCall::Demographics(decode(params)?),
            ProxyEndpoint::MarketTrends => ProxyCall::MarketTrends(decode(params)?),
            ProxyEndpoint::RoiCalculator => ProxyCall::RoiCalculator(decode(params)?),
        };
        call.validate()?;
        Ok(call)
    }

    pub fn endpoint(&self) -> ProxyEndpoint {
        match self {
            ProxyCall::MarketIntelligence(_) => ProxyEndpoint::MarketIntelligence,
            ProxyCall::PropertyAnalysis(_) => ProxyEndpoint::PropertyAnalysis,
            ProxyCall::NeighborhoodData(_) => ProxyEndpoint::NeighborhoodData,
            ProxyCall::PermitData(_) => ProxyEndpoint::PermitData,
            ProxyCall::Demographics(_) => ProxyEndpoint::Demographics,
            ProxyCall::MarketTrends(_) => ProxyEndpoint::MarketTrends,
            ProxyCall::RoiCalculator(_) => ProxyEndpoint::RoiCalculator,
        }
    }

    /// Keyed on the decoded params with defaults applied, so spellings that
    /// reach the upstream as the same request share one cache row.
    pub fn cache_key(&self) -> Result<String> {
        let endpoint = self.endpoint().as_str();
        match self {
            ProxyCall::MarketIntelligence(q) => cache_key(endpoint, q),
            ProxyCall::PropertyAnalysis(q) => cache_key(endpoint, q),
            ProxyCall::NeighborhoodData(q) => cache_key(endpoint, q),
            ProxyCall::PermitData(q) => cache_key(endpoint, q),
            ProxyCall::Demographics(q) => cache_key(endpoint, &q.with_default_radius()),
            ProxyCall::MarketTrends(q) => cache_key(endpoint, q),
            ProxyCall::RoiCalculator(inputs) => cache_key(endpoint, &inputs.upstream_request()),
        }
    }

    async fn execute(&self, client: &CoreAgentsClient) -> Result<Value> {
        match self {
            ProxyCall::MarketIntelligence(q) => client.market_intelligence(q).await,
            ProxyCall::PropertyAnalysis(q) => client.property_analysis(q).await,
            ProxyCall::NeighborhoodData(q) => client.neighborhood_data(&q.neighborhood).await,
            ProxyCall::PermitData(q) => client.permit_data(q).await,
            ProxyCall::Demographics(q) => client.demographics(q).await,
            ProxyCall::MarketTrends(q) => client.market_trends(q).await,
            ProxyCall::RoiCalculator(inputs) => client.calculate_roi(&inputs.upstream_request()).await,
        }
    }
}

impl Validate for ProxyCall {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        match self {
            ProxyCall::MarketIntelligence(q) => errors.non_empty("params.query", &q.query),
            ProxyCall::PropertyAnalysis(q) => errors.non_empty("params.address", &q.address),
            ProxyCall::NeighborhoodData(q) => errors.non_empty("params.neighborhood", &q.neighborhood),
            ProxyCall::PermitData(_) => {}
            ProxyCall::Demographics(q) => {
                errors.non_empty("params.location", &q.location);
                if let Some(radius) = q.radius {
                    errors.positive("params.radius", radius);
                }
            }
            ProxyCall::MarketTrends(q) => {
                if q.neighborhoods.iter().all(|n| n.trim().is_empty()) {
                    errors.push("params.neighborhoods", "at least one neighborhood is required");
                }
                errors.non_empty("params.timeframe", &q.timeframe);
            }
            ProxyCall::RoiCalculator(inputs) => return inputs.validate(),
        }
        errors.finish()
    }
}

pub async fn proxy(
    State(state): State<ApiState>,
    body: std::result::Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>> {
    let Json(req) = body?;
    let call = ProxyCall::parse(req.endpoint, req.params)?;
    let key = call.cache_key()?;

    let Cached { value, cached } = if req.use_cache {
        state
            .cache
            .get_or_compute(&key, state.proxy_ttl, || call.execute(&state.core_agents))
            .await?
    } else {
        debug!(endpoint = req.endpoint.as_str(), "proxy cache bypassed");
        Cached {
            value: call.execute(&state.core_agents).await?,
            cached: false,
        }
    };

    Ok(ApiResponse::with_cache_flag(value, cached))
}
