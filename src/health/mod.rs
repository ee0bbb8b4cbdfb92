/*!
 * # Health Check Module
 *
 * Liveness and readiness endpoints mounted at the root of the server:
 *
 * - `/health` - database-backed up/down status
 * - `/health/live` - process is alive
 * - `/health/version` - build information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub started: Instant,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            started: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthInfo {
        let database = match self.db_pool.ping().await {
            Ok(_) => HealthStatus::Up,
            Err(e) => {
                error!("Database health check failed: {}", e);
                HealthStatus::Down
            }
        };

        HealthInfo {
            status: database,
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
    }))
}

pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.check().await;
    let status_code = match health.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "uptime_seconds": state.started.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Creates router with health check endpoints
pub fn health_routes(db_pool: Arc<DatabaseConnection>) -> Router {
    let health_state = Arc::new(HealthState::new(db_pool));

    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(health_state)
}
