//! Liveness report for `/health`. Both probes are bounded by short timeouts
//! and neither failure makes the endpoint itself fail.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::api::{ApiResponse, ApiState};
use crate::config::DB_PING_TIMEOUT;
use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    fn from_ok(ok: bool) -> Self {
        if ok {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub core_agents: CheckStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub checks: HealthChecks,
    pub version: &'static str,
    pub timestamp: String,
}

pub async fn get_health(State(state): State<ApiState>) -> Json<ApiResponse<HealthReport>> {
    let (database, core_agents) = tokio::join!(
        db::ping(&state.pool, DB_PING_TIMEOUT),
        state.core_agents.ping(),
    );

    if let Err(e) = &database {
        warn!(error = %e, "health: database check failed");
    }
    if let Err(e) = &core_agents {
        warn!(error = %e, "health: Core Agents check failed");
    }

    let checks = HealthChecks {
        database: CheckStatus::from_ok(database.is_ok()),
        core_agents: CheckStatus::from_ok(core_agents.is_ok()),
    };
    let status = if checks.database == CheckStatus::Up && checks.core_agents == CheckStatus::Up {
        ServiceStatus::Ok
    } else {
        ServiceStatus::Degraded
    };

    ApiResponse::ok(HealthReport {
        status,
        checks,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}
