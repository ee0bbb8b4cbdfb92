use crate::entities::{bill, bill_item};
use crate::handlers::common::{
    created_response, json_body, map_service_error, path_param, query_params, success_response,
};
use crate::services::billing::{BillLine, BillWithItems, NewBill};
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
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Creates the router for bill book and bill history endpoints
pub fn bills_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bills).post(create_bill))
        .route("/:id", get(get_bill))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BillLineRequest {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub product_id: Uuid,
    /// Units sold, must be positive
    #[schema(example = 2)]
    pub quantity: i32,
}

/// Body for recording a sale
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    #[serde(default)]
    pub items: Vec<BillLineRequest>,
    /// Optional client-side total; rejected when it disagrees with stock prices
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "25.00")]
    pub total_amount: Option<Decimal>,
}

impl From<CreateBillRequest> for NewBill {
    fn from(req: CreateBillRequest) -> Self {
        NewBill {
            items: req
                .items
                .into_iter()
                .map(|line| BillLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
            total_amount: req.total_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BillItemResponse {
    pub sno: i32,
    /// Empty once the product has been deleted
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String, example = "12.50")]
    pub price: Decimal,
    #[schema(value_type = String, example = "25.00")]
    pub total: Decimal,
}

impl From<bill_item::Model> for BillItemResponse {
    fn from(model: bill_item::Model) -> Self {
        Self {
            sno: model.sno,
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            price: model.price,
            total: model.total,
        }
    }
}

/// A bill as listed in the history
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BillSummaryResponse {
    pub id: Uuid,
    /// Short bill number shown to people
    #[schema(example = "440ABC")]
    pub reference: String,
    #[schema(value_type = String, example = "25.00")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<bill::Model> for BillSummaryResponse {
    fn from(model: bill::Model) -> Self {
        Self {
            reference: model.reference(),
            id: model.id,
            total_amount: model.total_amount,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BillResponse {
    pub id: Uuid,
    pub reference: String,
    #[schema(value_type = String, example = "25.00")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<BillItemResponse>,
}

impl From<BillWithItems> for BillResponse {
    fn from(value: BillWithItems) -> Self {
        let BillWithItems { bill, items } = value;
        Self {
            reference: bill.reference(),
            id: bill.id,
            total_amount: bill.total_amount,
            created_at: bill.created_at,
            items: items.into_iter().map(BillItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BillHistoryQuery {
    /// Maximum number of bills to return; capped by the server
    pub limit: Option<u64>,
}

/// Record a sale and take the sold units out of stock
#[utoipa::path(
    post,
    path = "/api/v1/bills",
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Bill created", body = crate::ApiResponse<BillResponse>),
        (status = 400, description = "Malformed body, invalid lines or total mismatch", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Bills"
)]
pub async fn create_bill(
    State(state): State<AppState>,
    payload: Result<Json<CreateBillRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;

    let created = state
        .services
        .billing
        .create_bill(request.into())
        .await
        .map_err(map_service_error)?;

    Ok(created_response(BillResponse::from(created)))
}

/// Bill history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/bills",
    params(BillHistoryQuery),
    responses(
        (status = 200, description = "Bills listed", body = crate::ApiResponse<Vec<BillSummaryResponse>>),
        (status = 400, description = "Unparsable query string", body = crate::errors::ErrorResponse)
    ),
    tag = "Bills"
)]
pub async fn list_bills(
    State(state): State<AppState>,
    query: Result<Query<BillHistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query_params(query)?;
    let bills = state
        .services
        .billing
        .list_bills(query.limit)
        .await
        .map_err(map_service_error)?;

    let data: Vec<BillSummaryResponse> = bills.into_iter().map(Into::into).collect();
    Ok(success_response(data))
}

/// A bill with its lines
#[utoipa::path(
    get,
    path = "/api/v1/bills/{id}",
    params(
        ("id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill retrieved", body = crate::ApiResponse<BillResponse>),
        (status = 400, description = "Malformed bill id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Bill not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Bills"
)]
pub async fn get_bill(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_param(id)?;
    let bill = state
        .services
        .billing
        .get_bill(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(BillResponse::from(bill)))
}
