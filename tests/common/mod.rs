#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use ramp_api::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{bill, product},
    events::{self, EventSender},
    AppState,
};

/// Helper harness for spinning up the application over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        Self::with_config(cfg).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::sqlite_memory())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let router = app_router(state.clone());

        Self {
            router,
            state,
            event_task,
        }
    }

    /// Send a request against the router, with a JSON body when given.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Creates a product over HTTP and returns the `data` object.
    pub async fn create_product(&self, name: &str, price: &str, quantity: i32) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/v1/products",
                Some(json!({ "name": name, "price": price, "quantity": quantity })),
            )
            .await;
        assert_eq!(response.status(), 201, "creating product {name}");
        response_json(response).await["data"].clone()
    }

    pub async fn product_row(&self, id: Uuid) -> Option<product::Model> {
        product::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("load product")
    }

    /// Writes a product row directly, backdating its creation time.
    pub async fn insert_product(
        &self,
        name: &str,
        quantity: i32,
        created_at: DateTime<Utc>,
    ) -> product::Model {
        let db = self.state.db.as_ref();
        let row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(Decimal::ONE),
            quantity: Set(quantity),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        }
        .insert(db)
        .await
        .expect("insert product");

        // Inserts stamp the current time, so set it afterwards
        product::Entity::update_many()
            .col_expr(product::Column::CreatedAt, Expr::value(created_at))
            .filter(product::Column::Id.eq(row.id))
            .exec(db)
            .await
            .expect("backdate product");

        product::Model { created_at, ..row }
    }

    /// Writes a bill row directly, for history tests that need fixed timestamps.
    pub async fn insert_bill(&self, total: Decimal, created_at: DateTime<Utc>) -> bill::Model {
        bill::ActiveModel {
            id: Set(Uuid::new_v4()),
            total_amount: Set(total),
            created_at: Set(created_at),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("insert bill")
    }

    pub async fn bill_count(&self) -> usize {
        bill::Entity::find()
            .all(self.state.db.as_ref())
            .await
            .expect("load bills")
            .len()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized as a JSON string.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
        .parse()
        .expect("decimal string")
}

pub fn id_of(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("expected uuid string, got {value}"))
}
