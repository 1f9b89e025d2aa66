use std::time::Duration;

use crate::error::{AppError, Result};

pub const CORE_AGENTS_URL: &str = "https://core-agents-6d4f5.up.railway.app";

/// Liveness check against SQLite. Failure is reported, never fatal.
pub const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness check against the Core Agents API. Failure is reported, never fatal.
pub const UPSTREAM_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Freshness window for the market-intelligence widget cache.
pub const MARKET_INTEL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Lead score bump for completing a calculator.
pub const TOOL_USED_SCORE_BONUS: i64 = 15;

/// Lead score bump when a known email resubmits the contact form.
pub const RESUBMISSION_SCORE_BONUS: i64 = 10;

/// Score assigned to a freshly created lead.
pub const INITIAL_LEAD_SCORE: i64 = 10;

/// Substituted for any market indicator the upstream (or caller) leaves out.
pub mod indicator_defaults {
    pub const PRICE_GROWTH: f64 = 5.2;
    pub const INVENTORY_MONTHS: f64 = 2.8;
    pub const INTEREST_RATE: f64 = 7.2;
    pub const POPULATION_GROWTH: f64 = 2.1;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub core_agents_url: String,
    /// Bearer token for the Core Agents API (CORE_AGENTS_SECRET_KEY)
    pub core_agents_secret_key: String,
    /// Whole-request timeout for upstream calls (CORE_AGENTS_TIMEOUT_SECS)
    pub core_agents_timeout_secs: u64,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Default TTL for proxied Core Agents responses (CACHE_TTL_SECS)
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            core_agents_url: std::env::var("CORE_AGENTS_URL")
                .unwrap_or_else(|_| CORE_AGENTS_URL.to_string()),
            core_agents_secret_key: std::env::var("CORE_AGENTS_SECRET_KEY").unwrap_or_default(),
            core_agents_timeout_secs: std::env::var("CORE_AGENTS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .unwrap_or(30),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "devintel.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse::<u64>()
                .map_err(|_| AppError::Config("CACHE_TTL_SECS must be a whole number of seconds".to_string()))?,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.core_agents_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
