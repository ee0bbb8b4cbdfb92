use std::str::FromStr;

use crate::entities::product;
use crate::errors::{field_errors_from, FieldErrors, ServiceError};
use crate::handlers::common::{
    created_response, json_body, map_service_error, no_content_response,
    normalize_optional_string, path_param, query_params, success_response,
};
use crate::services::stock::{ProductInput, StockStatus};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Json, Path, Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/low-stock", get(low_stock_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// Body for creating or replacing a product.
///
/// Fields are read loosely so that a wrong type is reported against the
/// field instead of failing the whole body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductRequest {
    /// Display name, trimmed and unique
    #[serde(default)]
    #[schema(value_type = String, example = "Blue Gel Pen")]
    pub name: Option<Value>,
    /// Unit price, a number or numeric string, must not be negative
    #[serde(default)]
    #[schema(value_type = String, example = "12.50")]
    pub price: Option<Value>,
    /// Units on hand, must not be negative
    #[serde(default)]
    #[schema(value_type = i32, example = 40)]
    pub quantity: Option<Value>,
}

fn parse_name(value: Option<Value>) -> Result<String, &'static str> {
    match value {
        None => Ok(String::new()),
        Some(Value::String(name)) => Ok(name),
        Some(_) => Err("Name must be a string"),
    }
}

fn parse_price(value: Option<Value>) -> Result<Decimal, &'static str> {
    let raw = match value {
        None => return Err("Price is required"),
        Some(Value::String(raw)) => raw.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(_) => return Err("Price must be a number"),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| "Price must be a number")
}

fn parse_quantity(value: Option<Value>) -> Result<i32, &'static str> {
    let whole = match value {
        None => return Err("Quantity is required"),
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    whole
        .and_then(|q| i32::try_from(q).ok())
        .ok_or("Quantity must be an integer")
}

impl TryFrom<ProductRequest> for ProductInput {
    type Error = ServiceError;

    fn try_from(req: ProductRequest) -> Result<Self, Self::Error> {
        let mut fields = FieldErrors::new();
        let mut report = |field: &str, message: &str| {
            fields
                .entry(field.to_string())
                .or_default()
                .push(message.to_string());
        };

        let name = parse_name(req.name).unwrap_or_else(|msg| {
            report("name", msg);
            String::new()
        });
        let price = parse_price(req.price).unwrap_or_else(|msg| {
            report("price", msg);
            Decimal::ZERO
        });
        let quantity = parse_quantity(req.quantity).unwrap_or_else(|msg| {
            report("quantity", msg);
            0
        });

        let input = ProductInput::new(name, price, quantity);
        if fields.is_empty() {
            return Ok(input);
        }

        // Rule failures on the fields that did parse are reported alongside
        if let Err(err) = input.normalized().validate() {
            for (field, messages) in field_errors_from(&err) {
                fields.entry(field).or_insert(messages);
            }
        }
        Err(ServiceError::FieldValidation(fields))
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "Blue Gel Pen")]
    pub name: String,
    #[schema(value_type = String, example = "12.50")]
    pub price: Decimal,
    #[schema(example = 40)]
    pub quantity: i32,
    /// Derived from quantity and the low-stock threshold
    pub status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductResponse {
    fn new(model: product::Model, low_stock_threshold: i32) -> Self {
        Self {
            status: StockStatus::classify(model.quantity, low_stock_threshold),
            id: model.id,
            name: model.name,
            price: model.price,
            quantity: model.quantity,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListQuery {
    /// Substring the product name must contain
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Quantity at or below which a product is listed; defaults to the configured threshold
    pub threshold: Option<i32>,
}

/// List products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Products listed", body = crate::ApiResponse<Vec<ProductResponse>>),
        (status = 400, description = "Unparsable query string", body = crate::errors::ErrorResponse),
        (status = 500, description = "Database error", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query_params(query)?;
    let stock = &state.services.stock;
    let search = normalize_optional_string(query.search);

    let products = stock
        .list_products(search.as_deref())
        .await
        .map_err(map_service_error)?;

    let threshold = stock.low_stock_threshold();
    let data: Vec<ProductResponse> = products
        .into_iter()
        .map(|p| ProductResponse::new(p, threshold))
        .collect();

    Ok(success_response(data))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Malformed body or invalid fields", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = ProductInput::try_from(json_body(payload)?).map_err(map_service_error)?;
    let stock = &state.services.stock;

    let product = stock
        .create_product(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProductResponse::new(
        product,
        stock.low_stock_threshold(),
    )))
}

/// Products running low on stock
#[utoipa::path(
    get,
    path = "/api/v1/products/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Low stock products", body = crate::ApiResponse<Vec<ProductResponse>>),
        (status = 400, description = "Negative or unparsable threshold", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn low_stock_products(
    State(state): State<AppState>,
    query: Result<Query<LowStockQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query_params(query)?;
    if matches!(query.threshold, Some(t) if t < 0) {
        return Err(ApiError::BadRequest(
            "threshold must be non-negative".to_string(),
        ));
    }

    let stock = &state.services.stock;
    let products = stock
        .low_stock_products(query.threshold)
        .await
        .map_err(map_service_error)?;

    let threshold = stock.low_stock_threshold();
    let data: Vec<ProductResponse> = products
        .into_iter()
        .map(|p| ProductResponse::new(p, threshold))
        .collect();

    Ok(success_response(data))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Malformed product id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn get_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_param(id)?;
    let stock = &state.services.stock;
    let product = stock.get_product(id).await.map_err(map_service_error)?;

    Ok(success_response(ProductResponse::new(
        product,
        stock.low_stock_threshold(),
    )))
}

/// Replace a product's name, price and quantity
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Product updated", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Malformed body or invalid fields", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn update_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_param(id)?;
    let input = ProductInput::try_from(json_body(payload)?).map_err(map_service_error)?;
    let stock = &state.services.stock;

    let product = stock
        .update_product(id, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::new(
        product,
        stock.low_stock_threshold(),
    )))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 400, description = "Malformed product id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_param(id)?;
    state
        .services
        .stock
        .delete_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}
