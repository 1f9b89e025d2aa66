//! ROI projection for a prospective development deal.
//!
//! The numbers come from the Core Agents calculator; this module validates
//! the request, reshapes it for the upstream, records the submission and
//! credits the lead. Upstream failure is surfaced as-is: there is no local
//! estimate to fall back to.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::TOOL_USED_SCORE_BONUS;
use crate::db::{DbWriter, LeadStore};
use crate::error::Result;
use crate::fetcher::{CoreAgentsClient, RoiCalculationRequest, RoiFactors};
use crate::validation::{FieldErrors, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BedroomsBathrooms {
    pub bedrooms: u32,
    pub bathrooms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiInputs {
    pub purchase_price: f64,
    pub renovation_cost: f64,
    /// Months.
    pub holding_period: f64,
    pub property_type: String,
    pub location: String,
    pub square_feet: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms_bathrooms: Option<BedroomsBathrooms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Validate for RoiInputs {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        errors.positive("purchasePrice", self.purchase_price);
        errors.non_negative("renovationCost", self.renovation_cost);
        errors.positive("holdingPeriod", self.holding_period);
        errors.non_empty("propertyType", &self.property_type);
        errors.non_empty("location", &self.location);
        errors.positive("squareFeet", self.square_feet);
        if let Some(rooms) = self.bedrooms_bathrooms {
            if rooms.bedrooms == 0 {
                errors.push("bedroomsBathrooms.bedrooms", "must be a positive integer");
            }
            errors.positive("bedroomsBathrooms.bathrooms", rooms.bathrooms);
        }
        errors.finish()
    }
}

impl RoiInputs {
    pub fn upstream_request(&self) -> RoiCalculationRequest {
        RoiCalculationRequest {
            purchase_price: self.purchase_price,
            renovation_cost: self.renovation_cost,
            location: self.location.clone(),
            property_type: self.property_type.clone(),
            additional_factors: RoiFactors {
                holding_period: self.holding_period,
                square_feet: self.square_feet,
                bedrooms_bathrooms: self.bedrooms_bathrooms,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiResult {
    pub total_cost: f64,
    pub projected_profit: f64,
    /// Percent.
    pub roi: f64,
    pub timeline: String,
    pub risks: Vec<RiskEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiReport {
    #[serde(flatten)]
    pub result: RoiResult,
    /// Absent when the submission could not be recorded.
    pub calculator_result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

// Upstream response: `{ result: {...}, recommendations?, analysis? }`.

#[derive(Debug, Deserialize)]
pub struct UpstreamRoi {
    result: UpstreamRoiResult,
    #[serde(default)]
    recommendations: Option<Value>,
    #[serde(default)]
    analysis: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamRoiResult {
    total_cost: f64,
    projected_profit: f64,
    roi: f64,
    #[serde(default)]
    timeline: Option<Value>,
    #[serde(default)]
    risks: Vec<RawRisk>,
}

/// Risks arrive either as bare strings or as structured entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRisk {
    Text(String),
    Entry(RiskEntry),
}

impl From<RawRisk> for RiskEntry {
    fn from(raw: RawRisk) -> Self {
        match raw {
            RawRisk::Text(description) => RiskEntry {
                category: "general".to_string(),
                description,
                severity: None,
            },
            RawRisk::Entry(entry) => entry,
        }
    }
}

fn timeline_label(raw: Option<Value>, holding_period: f64) -> String {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => format!("{n} months"),
        Some(Value::Null) | Some(Value::String(_)) | None => format!("{holding_period} months"),
        Some(other) => other.to_string(),
    }
}

impl UpstreamRoi {
    fn into_parts(self, inputs: &RoiInputs) -> (RoiResult, Option<Value>, Option<Value>) {
        let r = self.result;
        let result = RoiResult {
            total_cost: r.total_cost,
            projected_profit: r.projected_profit,
            roi: r.roi,
            timeline: timeline_label(r.timeline, inputs.holding_period),
            risks: r.risks.into_iter().map(RiskEntry::from).collect(),
        };
        (result, self.recommendations, self.analysis)
    }
}

/// Validates, asks the upstream calculator, records the result and credits
/// the lead. Only validation and upstream failures reach the caller.
pub async fn calculate(
    client: &CoreAgentsClient,
    writer: &DbWriter,
    leads: &LeadStore,
    inputs: &RoiInputs,
) -> Result<RoiReport> {
    inputs.validate()?;

    let started = Instant::now();
    let upstream: UpstreamRoi = client.calculate_roi(&inputs.upstream_request()).await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    let (result, recommendations, analysis) = upstream.into_parts(inputs);

    let calculator_result_id = match writer.insert_calculator_result(inputs, &result).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "failed to record calculator result");
            None
        }
    };

    if let Some(lead_id) = inputs.lead_id.as_deref() {
        credit_lead(leads, lead_id, duration_ms, calculator_result_id.as_deref()).await;
    }

    info!(
        location = %inputs.location,
        roi = result.roi,
        duration_ms,
        "ROI calculated"
    );

    Ok(RoiReport {
        result,
        calculator_result_id,
        recommendations,
        analysis,
    })
}

async fn credit_lead(leads: &LeadStore, lead_id: &str, duration_ms: u64, result_id: Option<&str>) {
    match leads.bump_score(lead_id, TOOL_USED_SCORE_BONUS).await {
        Ok(true) => {
            let details = json!({
                "tool": "roi_calculator",
                "durationMs": duration_ms,
                "resultId": result_id,
            });
            if let Err(e) = leads.record_interaction(lead_id, "tool_used", &details).await {
                warn!(lead_id, error = %e, "failed to record tool usage");
            }
        }
        Ok(false) => warn!(lead_id, "ROI calculation references an unknown lead"),
        Err(e) => warn!(lead_id, error = %e, "failed to credit lead for tool usage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::latency::LatencyStats;
    use crate::db::memory_pool;
    use crate::error::AppError;
    use crate::types::LeadSubmission;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn inputs() -> RoiInputs {
        RoiInputs {
            purchase_price: 450_000.0,
            renovation_cost: 0.0,
            holding_period: 18.0,
            property_type: "single-family".to_string(),
            location: "Cypress".to_string(),
            square_feet: 2_400.0,
            bedrooms_bathrooms: Some(BedroomsBathrooms {
                bedrooms: 4,
                bathrooms: 2.5,
            }),
            lead_id: None,
            session_id: None,
        }
    }

    fn upstream_body() -> Value {
        json!({
            "result": {
                "totalCost": 450000.0,
                "projectedProfit": 81000.0,
                "roi": 18.0,
                "timeline": 18,
                "risks": [
                    "Flood zone exposure",
                    {"category": "market", "description": "Rate sensitivity", "severity": "medium"}
                ]
            },
            "recommendations": ["Lock financing early"],
            "analysis": {"confidence": 0.8}
        })
    }

    fn client(server: &MockServer) -> CoreAgentsClient {
        CoreAgentsClient::new(server.base_url(), "k", Duration::from_secs(5), Arc::new(LatencyStats::new())).unwrap()
    }

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn zero_renovation_cost_is_allowed() {
        assert!(inputs().validate().is_ok());
    }

    #[test]
    fn invalid_inputs_report_each_field() {
        let mut bad = inputs();
        bad.purchase_price = 0.0;
        bad.renovation_cost = -1.0;
        bad.location = " ".to_string();
        bad.bedrooms_bathrooms = Some(BedroomsBathrooms {
            bedrooms: 0,
            bathrooms: 2.0,
        });
        assert_eq!(
            fields(bad.validate().unwrap_err()),
            vec!["purchasePrice", "renovationCost", "location", "bedroomsBathrooms.bedrooms"]
        );
    }

    #[test]
    fn upstream_request_nests_additional_factors() {
        let body = serde_json::to_value(inputs().upstream_request()).unwrap();
        assert_eq!(body["purchasePrice"], 450000.0);
        assert_eq!(body["additionalFactors"]["holdingPeriod"], 18.0);
        assert_eq!(body["additionalFactors"]["bedroomsBathrooms"]["bedrooms"], 4);
        assert!(body.get("leadId").is_none());
    }

    #[test]
    fn upstream_response_is_normalised() {
        let upstream: UpstreamRoi = serde_json::from_value(upstream_body()).unwrap();
        let (result, recommendations, _) = upstream.into_parts(&inputs());

        assert_eq!(result.timeline, "18 months");
        assert_eq!(result.risks[0].category, "general");
        assert_eq!(result.risks[0].description, "Flood zone exposure");
        assert_eq!(result.risks[1].severity.as_deref(), Some("medium"));
        assert!(recommendations.is_some());
    }

    #[test]
    fn missing_timeline_uses_holding_period() {
        assert_eq!(timeline_label(None, 12.0), "12 months");
        assert_eq!(timeline_label(Some(json!("Q3 2027")), 12.0), "Q3 2027");
    }

    #[test]
    fn report_flattens_result() {
        let upstream: UpstreamRoi = serde_json::from_value(upstream_body()).unwrap();
        let (result, recommendations, analysis) = upstream.into_parts(&inputs());
        let report = RoiReport {
            result,
            calculator_result_id: Some("abc".to_string()),
            recommendations,
            analysis,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["roi"], 18.0);
        assert_eq!(json["calculatorResultId"], "abc");
        assert_eq!(json["analysis"]["confidence"], 0.8);
    }

    #[tokio::test]
    async fn calculation_credits_the_lead() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(200).json_body(upstream_body());
            })
            .await;

        let pool = memory_pool().await;
        let writer = DbWriter::new(pool.clone());
        let leads = LeadStore::new(pool);
        let lead = leads
            .submit(&LeadSubmission {
                name: "Sam Ortiz".to_string(),
                email: "sam@example.com".to_string(),
                phone: None,
                company: None,
                source: "website".to_string(),
                timeline: None,
                budget_min: None,
                budget_max: None,
                message: None,
            })
            .await
            .unwrap()
            .lead;

        let mut req = inputs();
        req.lead_id = Some(lead.id.clone());
        let report = calculate(&client(&server), &writer, &leads, &req).await.unwrap();

        let id = report.calculator_result_id.expect("result recorded");
        assert!(writer.calculator_result(&id).await.unwrap().is_some());

        let updated = leads.get(&lead.id).await.unwrap().unwrap();
        assert_eq!(updated.score, 25);
        let latest = &leads.recent_interactions(&lead.id, 1).await.unwrap()[0];
        assert_eq!(latest.kind, "tool_used");
        let details: Value = serde_json::from_str(&latest.details).unwrap();
        assert_eq!(details["resultId"], id.as_str());
        assert_eq!(details["tool"], "roi_calculator");
    }

    #[tokio::test]
    async fn upstream_failure_is_not_recorded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(500);
            })
            .await;

        let pool = memory_pool().await;
        let writer = DbWriter::new(pool.clone());
        let leads = LeadStore::new(pool.clone());

        let err = calculate(&client(&server), &writer, &leads, &inputs()).await.unwrap_err();
        assert!(err.is_upstream());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM calculator_results")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn invalid_inputs_never_reach_upstream() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(200).json_body(upstream_body());
            })
            .await;

        let pool = memory_pool().await;
        let mut bad = inputs();
        bad.square_feet = -5.0;
        let err = calculate(&client(&server), &DbWriter::new(pool.clone()), &LeadStore::new(pool), &bad)
            .await
            .unwrap_err();

        assert_eq!(fields(err), vec!["squareFeet"]);
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn recording_failure_still_returns_result() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/tools/roi-calculator");
                then.status(200).json_body(upstream_body());
            })
            .await;

        let pool = memory_pool().await;
        pool.close().await;

        let report = calculate(&client(&server), &DbWriter::new(pool.clone()), &LeadStore::new(pool), &inputs())
            .await
            .unwrap();
        assert!(report.calculator_result_id.is_none());
        assert_eq!(report.result.roi, 18.0);
    }
}
