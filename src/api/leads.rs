use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::routes::CalculatorResultResponse;
use crate::api::{ApiResponse, ApiState};
use crate::db::leads::{LeadFilter, LeadSort};
use crate::db::models::{InteractionRow, LeadRow, LeadSummaryRow};
use crate::db::now_ms;
use crate::error::{AppError, FieldError, Result};
use crate::scorer::{qualifies, score_lead, LeadScoreBreakdown};
use crate::types::{LeadSubmission, LeadUpdate};
use crate::validation::Validate;

const RECENT_INTERACTIONS: i64 = 20;
const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 200;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: Value,
    pub created_at: i64,
}

impl From<InteractionRow> for InteractionResponse {
    fn from(r: InteractionRow) -> Self {
        Self {
            id: r.id,
            kind: r.kind,
            details: serde_json::from_str(&r.details).unwrap_or(Value::Null),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: LeadRow,
    pub interactions: Vec<InteractionResponse>,
    pub calculator_results: Vec<CalculatorResultResponse>,
}

/// Query for `GET /api/leads`. `status`, `source` and `days` accept `all`.
#[derive(Debug, Deserialize)]
pub struct LeadListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub days: Option<String>,
    #[serde(default)]
    pub sort: LeadSort,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct LeadPage {
    pub leads: Vec<LeadSummaryRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DeletedLead {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScoreResponse {
    pub lead_id: String,
    pub score: u8,
    pub qualified: bool,
    pub breakdown: LeadScoreBreakdown,
}

/// 201 for a new lead, 200 when an existing email was refreshed.
pub async fn submit_lead(
    State(state): State<ApiState>,
    body: std::result::Result<Json<LeadSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<LeadRow>>)> {
    let Json(submission) = body?;
    submission.validate()?;

    let outcome = state.leads.submit(&submission).await?;
    info!(
        lead_id = %outcome.lead.id,
        created = outcome.created,
        score = outcome.lead.score,
        "lead submitted"
    );

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, ApiResponse::ok(outcome.lead)))
}

pub async fn get_lead(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LeadDetail>>> {
    let lead = state
        .leads
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead".to_string()))?;
    let interactions = state
        .leads
        .recent_interactions(&id, RECENT_INTERACTIONS)
        .await?
        .into_iter()
        .map(InteractionResponse::from)
        .collect();
    let calculator_results = state
        .writer
        .calculator_results_for_lead(&id)
        .await?
        .into_iter()
        .map(CalculatorResultResponse::from)
        .collect();

    Ok(ApiResponse::ok(LeadDetail {
        lead,
        interactions,
        calculator_results,
    }))
}

fn unless_all(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

pub async fn list_leads(
    State(state): State<ApiState>,
    params: std::result::Result<Query<LeadListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<LeadPage>>> {
    let Query(params) = params?;
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let created_since = match unless_all(params.days) {
        None => None,
        Some(days) => match days.parse::<i64>() {
            Ok(n) if n > 0 => Some(now_ms().saturating_sub(n.saturating_mul(DAY_MS))),
            _ => {
                return Err(AppError::Validation(vec![FieldError::new(
                    "days",
                    "must be a positive number of days or `all`",
                )]))
            }
        },
    };

    let filter = LeadFilter {
        status: unless_all(params.status),
        source: unless_all(params.source),
        created_since,
        sort: params.sort,
        limit,
        offset: (page - 1).saturating_mul(limit),
    };
    let (leads, total) = state.leads.list(&filter).await?;

    Ok(ApiResponse::ok(LeadPage {
        leads,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

pub async fn update_lead(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<LeadUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<LeadRow>>> {
    let Json(update) = body?;
    update.validate()?;

    let lead = state
        .leads
        .update(&id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead".to_string()))?;
    info!(lead_id = %id, status = %lead.status, "lead updated");

    Ok(ApiResponse::ok(lead))
}

pub async fn delete_lead(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedLead>>> {
    if !state.leads.delete(&id).await? {
        return Err(AppError::NotFound("Lead".to_string()));
    }
    info!(lead_id = %id, "lead deleted");
    Ok(ApiResponse::ok(DeletedLead { id, deleted: true }))
}

/// Recomputes the score from the lead's full history and promotes it to
/// QUALIFIED when it clears the threshold.
pub async fn rescore_lead(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LeadScoreResponse>>> {
    let profile = state
        .leads
        .profile(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead".to_string()))?;

    let breakdown = score_lead(&profile);
    let score = breakdown.total();
    let qualified = qualifies(score);
    state.leads.apply_score(&id, score, qualified).await?;

    info!(lead_id = %id, score, qualified, "lead rescored");

    Ok(ApiResponse::ok(LeadScoreResponse {
        lead_id: id,
        score,
        qualified,
        breakdown,
    }))
}
