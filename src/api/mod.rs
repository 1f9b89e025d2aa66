pub mod core_agents;
pub mod health;
pub mod latency;
pub mod leads;
pub mod routes;

use axum::Json;
use serde::Serialize;

pub use routes::{router, ApiState};

/// Success envelope. Failures use `error::ErrorBody`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            cached: None,
        })
    }

    pub fn with_cache_flag(data: T, cached: bool) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            cached: Some(cached),
        })
    }
}
