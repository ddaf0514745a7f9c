use axum::{extract::State, response::Json, Extension};

use super::extract::ApiJson;
use crate::models::ShippingAddress;
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Save shipping address",
    description = "Replaces the caller's latest shipping address. The next order placed copies it.",
    request_body = ShippingAddress,
    responses(
        (status = 200, description = "Address saved", body = ApiResponse<ShippingAddress>),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn record_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(address): ApiJson<ShippingAddress>,
) -> Result<Json<ApiResponse<ShippingAddress>>, ServiceError> {
    let saved = state
        .services
        .order
        .record_checkout_details(&user.user_id, address)
        .await?;
    Ok(Json(ApiResponse::success(saved)))
}

#[utoipa::path(
    get,
    path = "/api/v1/checkout",
    summary = "Get saved shipping address",
    responses(
        (status = 200, description = "Latest address, or null", body = ApiResponse<ShippingAddress>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "checkout"
)]
pub async fn get_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Option<ShippingAddress>>>, ServiceError> {
    let latest = state
        .services
        .order
        .latest_checkout_details(&user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(latest)))
}
