use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RAMP API",
        version = "0.1.0",
        description = r#"
# RAMP Inventory and Billing API

Keeps a stock book of products and a bill book of sales.

- **Stock**: create, edit, delete and list products with price and quantity
- **Bills**: record a sale in one transaction that checks and decrements stock
- **History**: the latest bills and the lines of any bill

## Error Handling

Every failure returns the same body:

```json
{
  "error": "Bad Request",
  "message": "Validation failed",
  "fields": { "name": ["Name is required"] },
  "request_id": "6f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Stock", description = "Product catalog and stock levels"),
        (name = "Bills", description = "Bill creation and bill history"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::low_stock_products,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        crate::handlers::bills::create_bill,
        crate::handlers::bills::list_bills,
        crate::handlers::bills::get_bill,

        crate::api_status,
        crate::health_check,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,

            crate::handlers::products::ProductRequest,
            crate::handlers::products::ProductResponse,
            crate::services::stock::StockStatus,

            crate::handlers::bills::CreateBillRequest,
            crate::handlers::bills::BillLineRequest,
            crate::handlers::bills::BillResponse,
            crate::handlers::bills::BillItemResponse,
            crate::handlers::bills::BillSummaryResponse,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
