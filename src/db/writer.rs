use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CalculatorResultRow, MarketSnapshotRow};
use crate::db::now_ms;
use crate::error::Result;
use crate::roi::{RoiInputs, RoiResult};
use crate::types::MarketTimingReport;

/// Persists calculator submissions and market-timing snapshots.
#[derive(Clone)]
pub struct DbWriter {
    pool: SqlitePool,
}

impl DbWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One row per ROI calculator submission. Returns the new row id.
    pub async fn insert_calculator_result(&self, inputs: &RoiInputs, result: &RoiResult) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let inputs_json = serde_json::to_string(inputs)?;
        let risks_json = serde_json::to_string(&result.risks)?;

        sqlx::query(
            r#"
            INSERT INTO calculator_results (
                id, lead_id, session_id, calculator_type, inputs,
                roi, total_cost, projected_profit, timeline, risks,
                completed, created_at
            ) VALUES (?, ?, ?, 'roi', ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&id)
        .bind(&inputs.lead_id)
        .bind(&inputs.session_id)
        .bind(inputs_json)
        .bind(result.roi)
        .bind(result.total_cost)
        .bind(result.projected_profit)
        .bind(&result.timeline)
        .bind(risks_json)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn calculator_result(&self, id: &str) -> Result<Option<CalculatorResultRow>> {
        let row = sqlx::query_as::<_, CalculatorResultRow>(
            r#"
            SELECT id, lead_id, session_id, calculator_type, inputs,
                   roi, total_cost, projected_profit, timeline, risks, created_at
            FROM calculator_results
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Newest first.
    pub async fn calculator_results_for_lead(&self, lead_id: &str) -> Result<Vec<CalculatorResultRow>> {
        let rows = sqlx::query_as::<_, CalculatorResultRow>(
            r#"
            SELECT id, lead_id, session_id, calculator_type, inputs,
                   roi, total_cost, projected_profit, timeline, risks, created_at
            FROM calculator_results
            WHERE lead_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert_market_snapshot(&self, report: &MarketTimingReport) -> Result<i64> {
        let indicators = serde_json::to_string(&report.indicators)?;
        let result = sqlx::query(
            r#"
            INSERT INTO market_snapshots (
                source, indicators, buy_score, sell_score, hold_score,
                overall_score, recommendation, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.source.to_string())
        .bind(indicators)
        .bind(i64::from(report.buy_score))
        .bind(i64::from(report.sell_score))
        .bind(i64::from(report.hold_score))
        .bind(i64::from(report.overall_score))
        .bind(report.recommendation.to_string())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn recent_market_snapshots(&self, limit: i64) -> Result<Vec<MarketSnapshotRow>> {
        let rows = sqlx::query_as::<_, MarketSnapshotRow>(
            r#"
            SELECT id, source, indicators, buy_score, sell_score, hold_score,
                   overall_score, recommendation, created_at
            FROM market_snapshots
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
