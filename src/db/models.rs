/// Database row types matching `migrations/0001_init.sql`.
use serde::Serialize;

#[derive(Debug, sqlx::FromRow)]
pub struct CacheRow {
    pub payload: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeadRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub source: String,
    pub timeline: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub message: Option<String>,
    pub status: String,
    pub score: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A lead plus its activity counts, as listed for the admin view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummaryRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lead: LeadRow,
    pub interaction_count: i64,
    pub calculator_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InteractionRow {
    pub id: i64,
    pub kind: String,
    /// JSON text.
    pub details: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CalculatorResultRow {
    pub id: String,
    pub lead_id: Option<String>,
    pub session_id: Option<String>,
    pub calculator_type: String,
    pub inputs: String,
    pub roi: f64,
    pub total_cost: f64,
    pub projected_profit: f64,
    pub timeline: String,
    pub risks: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarketSnapshotRow {
    pub id: i64,
    pub source: String,
    pub indicators: String,
    pub buy_score: i64,
    pub sell_score: i64,
    pub hold_score: i64,
    pub overall_score: i64,
    pub recommendation: String,
    pub created_at: i64,
}
