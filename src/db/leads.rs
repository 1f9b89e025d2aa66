use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::{INITIAL_LEAD_SCORE, RESUBMISSION_SCORE_BONUS};
use crate::db::models::{InteractionRow, LeadRow, LeadSummaryRow};
use crate::db::now_ms;
use crate::error::Result;
use crate::scorer::LeadProfile;
use crate::types::{LeadStatus, LeadSubmission, LeadUpdate};

const LEAD_COLUMNS: &str = "id, name, email, phone, company, source, timeline, budget_min, budget_max, message, status, score, created_at, updated_at";

#[derive(Clone)]
pub struct LeadStore {
    pool: SqlitePool,
}

/// Ordering for lead listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Score,
    Name,
}

impl LeadSort {
    fn order_by(&self) -> &'static str {
        match self {
            LeadSort::CreatedAt => "created_at DESC, rowid DESC",
            LeadSort::UpdatedAt => "updated_at DESC, rowid DESC",
            LeadSort::Score => "score DESC, created_at DESC, rowid DESC",
            LeadSort::Name => "name ASC, rowid ASC",
        }
    }
}

/// Filters and paging for `LeadStore::list`. `None` filters match every lead.
#[derive(Debug, Clone)]
pub struct LeadFilter {
    pub status: Option<String>,
    pub source: Option<String>,
    /// Epoch millis; only leads created at or after this.
    pub created_since: Option<i64>,
    pub sort: LeadSort,
    pub limit: i64,
    pub offset: i64,
}

const LEAD_FILTER: &str = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR source = ?2) AND (?3 IS NULL OR created_at >= ?3)";

/// Outcome of a contact-form submission.
#[derive(Debug)]
pub struct SubmittedLead {
    pub lead: LeadRow,
    pub created: bool,
}

impl LeadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<LeadRow>> {
        let row = sqlx::query_as::<_, LeadRow>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Creates a lead, or refreshes the existing one with the same email and
    /// raises its score. Either way an interaction is logged.
    pub async fn submit(&self, submission: &LeadSubmission) -> Result<SubmittedLead> {
        let email = submission.normalized_email();
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, LeadRow>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?"))
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;

        let (id, created, kind) = match existing {
            Some(lead) => {
                sqlx::query(
                    r#"
                    UPDATE leads SET
                        name = ?, phone = ?, company = ?, source = ?, timeline = ?,
                        budget_min = ?, budget_max = ?, message = ?,
                        score = MIN(score + ?, 100),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&submission.name)
                .bind(&submission.phone)
                .bind(&submission.company)
                .bind(&submission.source)
                .bind(&submission.timeline)
                .bind(submission.budget_min)
                .bind(submission.budget_max)
                .bind(&submission.message)
                .bind(RESUBMISSION_SCORE_BONUS)
                .bind(now)
                .bind(&lead.id)
                .execute(&mut *tx)
                .await?;
                (lead.id, false, "form_resubmission")
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    r#"
                    INSERT INTO leads (
                        id, name, email, phone, company, source, timeline,
                        budget_min, budget_max, message, status, score,
                        created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&submission.name)
                .bind(&email)
                .bind(&submission.phone)
                .bind(&submission.company)
                .bind(&submission.source)
                .bind(&submission.timeline)
                .bind(submission.budget_min)
                .bind(submission.budget_max)
                .bind(&submission.message)
                .bind(LeadStatus::New.as_str())
                .bind(INITIAL_LEAD_SCORE)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                (id, true, "lead_created")
            }
        };

        let details = json!({ "source": submission.source });
        sqlx::query("INSERT INTO interactions (lead_id, kind, details, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(kind)
            .bind(details.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let lead = sqlx::query_as::<_, LeadRow>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SubmittedLead { lead, created })
    }

    /// One page of leads matching `filter`, plus the total match count.
    pub async fn list(&self, filter: &LeadFilter) -> Result<(Vec<LeadSummaryRow>, i64)> {
        let sql = format!(
            r#"
            SELECT {LEAD_COLUMNS},
                   (SELECT COUNT(*) FROM interactions i WHERE i.lead_id = leads.id) AS interaction_count,
                   (SELECT COUNT(*) FROM calculator_results c WHERE c.lead_id = leads.id) AS calculator_count
            FROM leads
            WHERE {LEAD_FILTER}
            ORDER BY {}
            LIMIT ?4 OFFSET ?5
            "#,
            filter.sort.order_by()
        );
        let rows = sqlx::query_as::<_, LeadSummaryRow>(&sql)
            .bind(&filter.status)
            .bind(&filter.source)
            .bind(filter.created_since)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM leads WHERE {LEAD_FILTER}"))
            .bind(&filter.status)
            .bind(&filter.source)
            .bind(filter.created_since)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    /// Applies the present fields of `update`. A status change is logged as a
    /// `status_changed` interaction. `None` if no such lead.
    pub async fn update(&self, id: &str, update: &LeadUpdate) -> Result<Option<LeadRow>> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        let Some(existing) = sqlx::query_as::<_, LeadRow>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE leads SET
                name = COALESCE(?, name),
                phone = COALESCE(?, phone),
                company = COALESCE(?, company),
                source = COALESCE(?, source),
                timeline = COALESCE(?, timeline),
                budget_min = COALESCE(?, budget_min),
                budget_max = COALESCE(?, budget_max),
                message = COALESCE(?, message),
                status = COALESCE(?, status),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.name)
        .bind(&update.phone)
        .bind(&update.company)
        .bind(&update.source)
        .bind(&update.timeline)
        .bind(update.budget_min)
        .bind(update.budget_max)
        .bind(&update.message)
        .bind(update.status.map(|s| s.as_str()))
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(status) = update.status.filter(|s| s.as_str() != existing.status) {
            let details = json!({ "from": existing.status, "to": status.as_str() });
            sqlx::query("INSERT INTO interactions (lead_id, kind, details, created_at) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind("status_changed")
                .bind(details.to_string())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let lead = sqlx::query_as::<_, LeadRow>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(lead))
    }

    /// Removes the lead with its interactions and calculator results. False if
    /// no such lead.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM interactions WHERE lead_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM calculator_results WHERE lead_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM leads WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_interaction(&self, lead_id: &str, kind: &str, details: &serde_json::Value) -> Result<i64> {
        let result = sqlx::query("INSERT INTO interactions (lead_id, kind, details, created_at) VALUES (?, ?, ?, ?)")
            .bind(lead_id)
            .bind(kind)
            .bind(details.to_string())
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn recent_interactions(&self, lead_id: &str, limit: i64) -> Result<Vec<InteractionRow>> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT id, kind, details, created_at
            FROM interactions
            WHERE lead_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(lead_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn calculator_count(&self, lead_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM calculator_results WHERE lead_id = ?")
            .bind(lead_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Adds `delta` to the lead's score, capped at 100. False if no such lead.
    pub async fn bump_score(&self, lead_id: &str, delta: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE leads SET score = MIN(score + ?, 100), updated_at = ? WHERE id = ?")
            .bind(delta)
            .bind(now_ms())
            .bind(lead_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stores a recomputed score; a qualifying score also promotes the status.
    pub async fn apply_score(&self, lead_id: &str, score: u8, qualified: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads SET
                score = ?,
                status = CASE WHEN ? THEN ? ELSE status END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(score))
        .bind(qualified)
        .bind(LeadStatus::Qualified.as_str())
        .bind(now_ms())
        .bind(lead_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn profile(&self, lead_id: &str) -> Result<Option<LeadProfile>> {
        let Some(lead) = self.get(lead_id).await? else {
            return Ok(None);
        };

        let kinds: Vec<String> = sqlx::query_scalar("SELECT DISTINCT kind FROM interactions WHERE lead_id = ?")
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await?;
        let calculators = self.calculator_count(lead_id).await?;

        Ok(Some(LeadProfile {
            interaction_kinds: kinds.into_iter().collect::<HashSet<_>>(),
            calculator_results: calculators.max(0) as usize,
            timeline: lead.timeline,
            budget_max: lead.budget_max,
        }))
    }
}
