use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{extract::JsonOrDefault, parse_order_id};
use crate::models::{Order, OrderItem, OrderStatus, PaymentRecord, ProgressMap, ShippingAddress};
use crate::services::orders::CreateOrderRequest;
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    #[schema(value_type = String, example = "500.00")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "1000.00")]
    pub line_total: Decimal,
    pub name: String,
    pub image: Option<String>,
    /// Stage name → time the stage was reached
    #[schema(value_type = Object)]
    pub progress: ProgressMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub owner: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    #[schema(value_type = String, example = "2200.00")]
    pub total: Decimal,
    pub shipping_snapshot: Option<ShippingAddress>,
    pub payment: Option<PaymentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            line_total: item.line_total(),
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            name: item.name,
            image: item.image,
            progress: item.progress,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            total: order.total(),
            id: order.id,
            owner: order.owner,
            status: order.status,
            items: order.items.into_iter().map(Into::into).collect(),
            shipping_snapshot: order.shipping_snapshot,
            payment: order.payment,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Create an order from the request items, or from the caller's cart when no items are given",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Empty cart or invalid items", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonOrDefault(request): JsonOrDefault<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state
        .services
        .order
        .create_order(&user.user_id, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderResponse::from(order))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    description = "Orders placed by the authenticated customer, newest first",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.order.list_for_owner(&user.user_id).await?;
    Ok(Json(ApiResponse::success(
        orders.into_iter().map(OrderResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get my order",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_my_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let id = parse_order_id(&id)?;
    let order = state.services.order.get_for_owner(&user.user_id, id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}
