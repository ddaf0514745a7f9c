use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{extract::ApiJson, orders::OrderResponse, parse_order_id};
use crate::repositories::OrderListFilter;
use crate::services::{fulfillment::parse_stage, orders::parse_status};
use crate::{errors::ServiceError, ApiResponse, AppState, PaginatedResponse};

const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct AdminOrderQuery {
    /// Page number (default: 1)
    pub page: Option<u64>,
    /// Items per page (default: 20, max: 100)
    pub limit: Option<u64>,
    /// Only orders with this status
    pub status: Option<String>,
}

impl AdminOrderQuery {
    fn into_filter(self) -> Result<OrderListFilter, ServiceError> {
        let status = match self.status.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_status(Some(raw))?),
            _ => None,
        };
        Ok(OrderListFilter {
            status,
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    #[schema(example = "cancelled")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MarkStageRequest {
    #[schema(example = "dispatched")]
    pub stage: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List all orders",
    description = "Every order across all customers, newest first",
    params(AdminOrderQuery),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let filter = query.into_filter()?;
    let page = state.services.order.list_all(&filter).await?;
    let total_pages = page.total.div_ceil(filter.limit);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: page.orders.into_iter().map(OrderResponse::from).collect(),
        total: page.total,
        page: filter.page,
        limit: filter.limit,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    summary = "Get any order",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn get_any_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let id = parse_order_id(&id)?;
    let order = state.services.order.get_any(id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}",
    summary = "Override order status",
    description = "Sets the status directly. Item progress is not changed.",
    params(("id" = String, Path, description = "Order ID")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn set_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SetStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let id = parse_order_id(&id)?;
    let order = state
        .services
        .order
        .set_status(id, request.status.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/item/{product_id}",
    summary = "Mark item stage",
    description = "Stamps a fulfillment stage on one item and recomputes the order status",
    params(
        ("id" = String, Path, description = "Order ID"),
        ("product_id" = String, Path, description = "Product ID of the item"),
    ),
    request_body = MarkStageRequest,
    responses(
        (status = 200, description = "Stage recorded", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing or unknown stage", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn mark_item_stage(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(String, String)>,
    ApiJson(request): ApiJson<MarkStageRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let stage = parse_stage(request.stage.as_deref())?;
    let id = parse_order_id(&id)?;
    let order = state
        .services
        .fulfillment
        .mark_item_stage(id, &product_id, stage)
        .await?;
    Ok(Json(ApiResponse::success(order.into())))
}
