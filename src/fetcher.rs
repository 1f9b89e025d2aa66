//! Client for the Core Agents market-intelligence API.
//!
//! Every call is bearer-authenticated and timed into the shared latency
//! histogram. Non-2xx responses become `AppError::Upstream`. Nothing here
//! retries; callers decide whether to substitute degraded-mode data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::config::UPSTREAM_PING_TIMEOUT;
use crate::error::{AppError, Result};
use crate::types::{MarketIndicators, ConstructionTrend, PermitActivity, PricePoint};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQuery {
    pub city: String,
    pub state: String,
}

impl LocationQuery {
    pub fn houston() -> Self {
        Self {
            city: "Houston".to_string(),
            state: "TX".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIntelligenceQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketIntelligenceBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a serde_json::Map<String, serde_json::Value>>,
    options: AnalysisOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOptions {
    include_analysis: bool,
    include_recommendations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnalysisQuery {
    pub address: String,
    /// Any other fields are forwarded next to `address`.
    #[serde(flatten)]
    pub additional_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodQuery {
    pub neighborhood: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit_type: Option<String>,
}

/// Search radius in miles when the caller gives none.
pub const DEFAULT_DEMOGRAPHICS_RADIUS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsQuery {
    pub location: String,
    #[serde(default)]
    pub radius: Option<f64>,
}

impl DemographicsQuery {
    pub fn with_default_radius(&self) -> Self {
        Self {
            location: self.location.clone(),
            radius: Some(self.radius.unwrap_or(DEFAULT_DEMOGRAPHICS_RADIUS)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrendsQuery {
    pub neighborhoods: Vec<String>,
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiCalculationRequest {
    pub purchase_price: f64,
    pub renovation_cost: f64,
    pub location: String,
    pub property_type: String,
    pub additional_factors: RoiFactors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiFactors {
    pub holding_period: f64,
    pub square_feet: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms_bathrooms: Option<crate::roi::BedroomsBathrooms>,
}

// ---------------------------------------------------------------------------
// Response feeds. Every field is optional: the upstream omits freely and
// callers fill gaps from the degraded-mode table.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTimingFeed {
    pub price_growth: Option<f64>,
    pub inventory_months: Option<f64>,
    pub interest_rates: Option<f64>,
    pub construction_costs: Option<String>,
    pub permit_activity: Option<String>,
    pub population_growth: Option<f64>,
}

impl MarketTimingFeed {
    /// Unrecognised trend or activity labels count as absent.
    pub fn indicators(&self) -> MarketIndicators {
        MarketIndicators {
            price_growth: self.price_growth,
            inventory_months: self.inventory_months,
            interest_rate: self.interest_rates,
            construction_costs: self.construction_costs.as_deref().and_then(ConstructionTrend::parse),
            permit_activity: self.permit_activity.as_deref().and_then(PermitActivity::parse),
            population_growth: self.population_growth,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIntelligenceFeed {
    pub avg_price_per_sq_ft: Option<f64>,
    pub price_change: Option<f64>,
    pub days_on_market: Option<f64>,
    pub dom_change: Option<f64>,
    pub active_listings: Option<f64>,
    pub listings_change: Option<f64>,
    #[serde(default)]
    pub price_history: Option<Vec<PricePoint>>,
    #[serde(default)]
    pub insights: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodFeed {
    pub avg_price_per_sq_ft: Option<f64>,
    pub year_over_year_growth: Option<f64>,
    pub inventory_level: Option<f64>,
    pub demand_score: Option<f64>,
    pub median_price: Option<f64>,
    pub days_on_market: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoreAgentsClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    latency: Arc<LatencyStats>,
}

impl CoreAgentsClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
        latency: Arc<LatencyStats>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            latency,
        })
    }

    pub async fn market_timing(&self, location: &LocationQuery) -> Result<MarketTimingFeed> {
        self.post("/api/intelligence/market-timing", location).await
    }

    pub async fn market_intelligence<T: DeserializeOwned>(&self, query: &MarketIntelligenceQuery) -> Result<T> {
        let body = MarketIntelligenceBody {
            query: &query.query,
            context: query.context.as_ref(),
            options: AnalysisOptions {
                include_analysis: true,
                include_recommendations: true,
            },
        };
        self.post("/api/intelligence/market", &body).await
    }

    pub async fn property_analysis<T: DeserializeOwned>(&self, query: &PropertyAnalysisQuery) -> Result<T> {
        self.post("/api/intelligence/property", query).await
    }

    pub async fn neighborhood_data<T: DeserializeOwned>(&self, neighborhood: &str) -> Result<T> {
        let body = NeighborhoodQuery {
            neighborhood: neighborhood.to_string(),
        };
        self.post("/api/intelligence/neighborhood", &body).await
    }

    pub async fn permit_data<T: DeserializeOwned>(&self, query: &PermitQuery) -> Result<T> {
        self.post("/api/intelligence/permits", query).await
    }

    pub async fn demographics<T: DeserializeOwned>(&self, query: &DemographicsQuery) -> Result<T> {
        self.post("/api/intelligence/demographics", &query.with_default_radius()).await
    }

    pub async fn market_trends<T: DeserializeOwned>(&self, query: &MarketTrendsQuery) -> Result<T> {
        self.post("/api/intelligence/trends", query).await
    }

    pub async fn calculate_roi<T: DeserializeOwned>(&self, request: &RoiCalculationRequest) -> Result<T> {
        self.post("/api/tools/roi-calculator", request).await
    }

    /// Liveness probe with its own short timeout. Any 2xx counts as up.
    pub async fn ping(&self) -> Result<()> {
        let req = self.http.get(self.url("/health"));
        match tokio::time::timeout(UPSTREAM_PING_TIMEOUT, self.send_raw("/health", req)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(AppError::Timeout("Core Agents ping".to_string())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.http.post(self.url(path)).json(body);
        let resp = self.send_raw(path, req).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_raw(&self, path: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let started = Instant::now();
        let result = req.bearer_auth(&self.secret_key).send().await;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);

        let resp = result.map_err(|e| {
            warn!(path, error = %e, "Core Agents request failed");
            AppError::from(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(path, status = status.as_u16(), "Core Agents returned an error status");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        debug!(path, elapsed_ms = elapsed.as_millis() as u64, "Core Agents call ok");
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, latency: Arc<LatencyStats>) -> CoreAgentsClient {
        CoreAgentsClient::new(server.base_url(), "test-secret", Duration::from_secs(5), latency)
            .expect("client builds")
    }

    #[tokio::test]
    async fn sends_bearer_token_and_parses_feed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/intelligence/market-timing")
                    .header("authorization", "Bearer test-secret")
                    .json_body(json!({"city": "Houston", "state": "TX"}));
                then.status(200).json_body(json!({
                    "priceGrowth": 6.1,
                    "inventoryMonths": 2.4,
                    "constructionCosts": "Rising",
                    "permitActivity": "surging"
                }));
            })
            .await;

        let latency = Arc::new(LatencyStats::new());
        let feed = client(&server, Arc::clone(&latency))
            .market_timing(&LocationQuery::houston())
            .await
            .unwrap();

        mock.assert_async().await;
        let ind = feed.indicators();
        assert_eq!(ind.price_growth, Some(6.1));
        assert_eq!(ind.construction_costs, Some(ConstructionTrend::Rising));
        assert_eq!(ind.permit_activity, None);
        assert_eq!(ind.interest_rate, None);
        assert_eq!(latency.snapshot().samples, 1);
    }

    #[tokio::test]
    async fn error_status_becomes_upstream_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(502).body("gateway down");
            })
            .await;

        let request = RoiCalculationRequest {
            purchase_price: 1.0,
            renovation_cost: 0.0,
            location: "Katy".to_string(),
            property_type: "land".to_string(),
            additional_factors: RoiFactors {
                holding_period: 12.0,
                square_feet: 1000.0,
                bedrooms_bathrooms: None,
            },
        };
        let err = client(&server, Arc::new(LatencyStats::new()))
            .calculate_roi::<serde_json::Value>(&request)
            .await
            .unwrap_err();

        match err {
            AppError::Upstream { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "gateway down");
            }
            other => panic!("expected upstream error, got {other}"),
        }
    }

    #[tokio::test]
    async fn demographics_radius_defaults_to_five_miles() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/intelligence/demographics")
                    .json_body(json!({"location": "Pearland", "radius": 5.0}));
                then.status(200).json_body(json!({"population": 125000}));
            })
            .await;

        let body: serde_json::Value = client(&server, Arc::new(LatencyStats::new()))
            .demographics(&DemographicsQuery {
                location: "Pearland".to_string(),
                radius: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body["population"], 125000);
    }

    #[tokio::test]
    async fn market_intelligence_requests_analysis() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/intelligence/market")
                    .json_body_partial(r#"{"options":{"includeAnalysis":true,"includeRecommendations":true}}"#);
                then.status(200).json_body(json!({"avgPricePerSqFt": 190.0}));
            })
            .await;

        let feed: MarketIntelligenceFeed = client(&server, Arc::new(LatencyStats::new()))
            .market_intelligence(&MarketIntelligenceQuery {
                query: "Houston market overview".to_string(),
                context: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(feed.avg_price_per_sq_ft, Some(190.0));
        assert!(feed.price_history.is_none());
    }

    #[tokio::test]
    async fn ping_reports_up_and_down() {
        let server = MockServer::start_async().await;
        let mut health = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200);
            })
            .await;

        let c = client(&server, Arc::new(LatencyStats::new()));
        assert!(c.ping().await.is_ok());

        health.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503);
            })
            .await;
        assert!(c.ping().await.unwrap_err().is_upstream());
    }

    #[tokio::test]
    async fn slow_ping_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).delay(Duration::from_secs(5));
            })
            .await;

        let started = Instant::now();
        let err = client(&server, Arc::new(LatencyStats::new())).ping().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, AppError::Timeout(_)), "got {err}");
        assert!(err.is_upstream());
        assert!(elapsed >= UPSTREAM_PING_TIMEOUT, "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "returned after {elapsed:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_an_upstream_error() {
        let c = CoreAgentsClient::new(
            "http://127.0.0.1:9",
            "",
            Duration::from_secs(2),
            Arc::new(LatencyStats::new()),
        )
        .unwrap();
        let err = c.neighborhood_data::<NeighborhoodFeed>("cypress").await.unwrap_err();
        assert!(err.is_upstream());
    }
}
