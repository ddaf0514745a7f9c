use axum::{extract::State, response::Json, Extension};

use super::extract::ApiJson;
use crate::services::payments::{
    CreateRemoteOrderRequest, PaymentVerification, RemoteOrderResponse, VerifyPaymentRequest,
};
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/payment/create-order",
    summary = "Create gateway order",
    description = "Opens a Razorpay order for the amount. With orderId the gateway order is linked to that order.",
    request_body = CreateRemoteOrderRequest,
    responses(
        (status = 200, description = "Gateway order created", body = ApiResponse<RemoteOrderResponse>),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Linked order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn create_payment_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(request): ApiJson<CreateRemoteOrderRequest>,
) -> Result<Json<ApiResponse<RemoteOrderResponse>>, ServiceError> {
    let remote = state
        .services
        .payments
        .create_remote_order(&user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(remote)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payment/verify",
    summary = "Verify payment",
    description = "Checks the checkout signature and marks the linked order's payment as verified",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = ApiResponse<PaymentVerification>),
        (status = 400, description = "Missing fields or invalid signature", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    ApiJson(request): ApiJson<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentVerification>>, ServiceError> {
    let verification = state.services.payments.verify_payment(request).await?;
    Ok(Json(ApiResponse::success(verification)))
}
