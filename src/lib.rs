//! RAMP API Library
//!
//! Stock book, bill book and bill history over a relational store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires the services over an existing pool and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), Arc::new(event_sender), &config);
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Stock book
        .nest("/products", handlers::products::products_routes())
        // Bill book and history
        .nest("/bills", handlers::bills::bills_routes())
}

/// Full application router without the transport layers (CORS, compression)
/// that depend on deployment configuration.
pub fn app_router(state: AppState) -> Router {
    let health = health::health_routes(state.db.clone());

    Router::<AppState>::new()
        .route("/", get(|| async { "ramp-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
        .nest("/health", health)
        .layer(crate::tracing::configure_http_tracing())
        // Outermost so the span and every envelope see the request id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}

/// Service status and build information
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Service is running", body = ApiResponse<serde_json::Value>)
    ),
    tag = "Health"
)]
pub async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "ramp-api",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

/// Database connectivity check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Health report", body = ApiResponse<serde_json::Value>)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
