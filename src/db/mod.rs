pub mod cache;
pub mod leads;
pub mod models;
pub mod writer;

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

pub use cache::{Cached, ResponseCache};
pub use leads::LeadStore;
pub use writer::DbWriter;

/// Opens (creating if needed) the SQLite database at `db_path`.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Round-trips a trivial query within `timeout`.
pub async fn ping(pool: &SqlitePool, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(result) => result.map(|_| ()).map_err(AppError::from),
        Err(_) => Err(AppError::Timeout("database ping".to_string())),
    }
}

/// Unix epoch milliseconds, the unit for every timestamp column.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Single-connection in-memory database with the real migrations applied.
/// The connection must never be recycled or the database vanishes with it.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite opens");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}
