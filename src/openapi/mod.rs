use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Saree Orders API",
        version = "0.1.0",
        description = r#"
# Saree Storefront Orders API

Order placement, payment capture and fulfillment tracking for the storefront.

## Authentication

Every `/api/v1` endpoint other than `/health` and `/status` takes a bearer JWT:

```
Authorization: Bearer <your-jwt-token>
```

Routes under `/api/v1/admin` additionally need the `admin` role.

## Fulfillment stages

Each order item moves through `placed`, `dispatched`, `in_transit`, `shipped`,
`out_for_delivery` and `delivered`. The order status is the most advanced stage any
item has reached.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Cart is empty",
  "request_id": "2b7c0e0e-6f5b-4a59-9a8e-2f0f1c3d4e5f",
  "timestamp": "2026-01-01T00:00:00Z"
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
        (name = "orders", description = "Customer order endpoints"),
        (name = "checkout", description = "Shipping address capture"),
        (name = "payments", description = "Razorpay order creation and verification"),
        (name = "admin", description = "Administrative order management")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,

        crate::handlers::checkout::record_checkout,
        crate::handlers::checkout::get_checkout,

        crate::handlers::payments::create_payment_order,
        crate::handlers::payments::verify_payment,

        crate::handlers::admin_orders::list_all_orders,
        crate::handlers::admin_orders::get_any_order,
        crate::handlers::admin_orders::set_order_status,
        crate::handlers::admin_orders::mark_item_stage,
    ),
    components(
        schemas(
            crate::models::Stage,
            crate::models::OrderStatus,
            crate::models::ShippingAddress,
            crate::models::PaymentRecord,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::payments::CreateRemoteOrderRequest,
            crate::services::payments::RemoteOrderResponse,
            crate::services::payments::VerifyPaymentRequest,
            crate::services::payments::PaymentVerification,
            crate::handlers::admin_orders::SetStatusRequest,
            crate::handlers::admin_orders::MarkStageRequest,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
