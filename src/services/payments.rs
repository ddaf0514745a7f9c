use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{OrderStatus, OrderUpdate, PaymentRecord};
use crate::repositories::OrderRepository;
use crate::services::payment_gateway::{
    to_minor_units, verify_signature, GatewayOrderRequest, PaymentGateway,
};

pub const PAYMENT_METHOD_RAZORPAY: &str = "razorpay";

/// Request to open a gateway order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRemoteOrderRequest {
    /// Amount in major units (rupees)
    #[schema(value_type = String, example = "2200.00")]
    pub amount: Decimal,
    /// Order to link the gateway order to
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrderResponse {
    pub gateway_order_id: String,
    /// Amount in minor units (paise)
    pub amount_minor_units: i64,
    pub currency: String,
    /// Public key the checkout widget is opened with
    pub public_key: Option<String>,
    pub order_id: Option<Uuid>,
}

/// Fields posted back by the checkout widget
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: Option<String>,
    #[serde(default)]
    pub razorpay_payment_id: Option<String>,
    #[serde(default)]
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub verified: bool,
    /// Order the payment was recorded on, when one is linked
    pub order_id: Option<Uuid>,
    pub already_verified: bool,
}

/// Gateway settings the service needs beyond the HTTP client
#[derive(Clone, Default)]
pub struct PaymentSettings {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub currency: String,
}

#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            gateway,
            settings,
        }
    }

    /// Opens a gateway order for `amount`, optionally linking it to one of the caller's orders
    #[instrument(skip(self, request), fields(amount = %request.amount, order_id = ?request.order_id))]
    pub async fn create_remote_order(
        &self,
        owner: &str,
        request: CreateRemoteOrderRequest,
    ) -> Result<RemoteOrderResponse, ServiceError> {
        let amount_minor = to_minor_units(request.amount)?;

        let linked = match request.order_id {
            Some(order_id) => {
                let order = self
                    .orders
                    .find_order_by_id(order_id)
                    .await?
                    .filter(|order| order.is_owned_by(owner))
                    .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
                if order.total() != request.amount {
                    return Err(ServiceError::ValidationError(format!(
                        "amount {} does not match order total {}",
                        request.amount,
                        order.total()
                    )));
                }
                if order.payment.as_ref().is_some_and(|p| p.verified) {
                    return Err(ServiceError::ValidationError(
                        "order is already paid".to_string(),
                    ));
                }
                Some(order)
            }
            None => None,
        };

        let receipt = match &linked {
            Some(order) => order.id.to_string(),
            None => format!("rcpt_{}", Uuid::new_v4().simple()),
        };
        let remote = self
            .gateway
            .create_order(&GatewayOrderRequest {
                amount: amount_minor,
                currency: self.settings.currency.clone(),
                receipt,
            })
            .await?;
        counter!("saree_orders.payments.gateway_orders_created", 1);

        if let Some(order) = &linked {
            let status = (order.status == OrderStatus::Placed).then_some(OrderStatus::PendingPayment);
            self.orders
                .update_order(
                    order.id,
                    OrderUpdate {
                        status,
                        payment: Some(PaymentRecord::pending(PAYMENT_METHOD_RAZORPAY, &remote.id)),
                    },
                )
                .await?;
            info!(order_id = %order.id, gateway_order_id = %remote.id, "Gateway order linked");
        }

        Ok(RemoteOrderResponse {
            gateway_order_id: remote.id,
            amount_minor_units: remote.amount,
            currency: remote.currency,
            public_key: self.settings.key_id.clone(),
            order_id: linked.map(|order| order.id),
        })
    }

    /// Checks the checkout signature and records the capture on the linked order
    #[instrument(skip(self, request), fields(gateway_order_id = ?request.razorpay_order_id))]
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<PaymentVerification, ServiceError> {
        let (gateway_order_id, gateway_payment_id, signature) = required_fields(&request)?;

        let secret = self.settings.key_secret.as_deref().ok_or_else(|| {
            ServiceError::GatewayUnavailable("gateway credentials are not configured".to_string())
        })?;

        if !verify_signature(gateway_order_id, gateway_payment_id, signature, secret) {
            counter!("saree_orders.payments.signature_failures", 1);
            warn!(gateway_order_id, "Payment signature mismatch");
            return Err(ServiceError::ValidationError(
                "invalid payment signature".to_string(),
            ));
        }

        let Some(order) = self
            .orders
            .find_order_by_gateway_order_id(gateway_order_id)
            .await?
        else {
            warn!(gateway_order_id, "Verified payment has no linked order");
            return Ok(PaymentVerification {
                verified: true,
                order_id: None,
                already_verified: false,
            });
        };

        if order.payment.as_ref().is_some_and(|p| p.verified) {
            info!(order_id = %order.id, "Payment already verified");
            return Ok(PaymentVerification {
                verified: true,
                order_id: Some(order.id),
                already_verified: true,
            });
        }

        let method = order
            .payment
            .as_ref()
            .map(|p| p.method.clone())
            .unwrap_or_else(|| PAYMENT_METHOD_RAZORPAY.to_string());
        let status = (order.status == OrderStatus::PendingPayment).then_some(OrderStatus::Placed);
        self.orders
            .update_order(
                order.id,
                OrderUpdate {
                    status,
                    payment: Some(PaymentRecord {
                        method,
                        gateway_order_id: gateway_order_id.to_string(),
                        gateway_payment_id: Some(gateway_payment_id.to_string()),
                        verified: true,
                        verified_at: Some(Utc::now()),
                    }),
                },
            )
            .await?;

        counter!("saree_orders.payments.verified", 1);
        info!(order_id = %order.id, "Payment verified");
        Ok(PaymentVerification {
            verified: true,
            order_id: Some(order.id),
            already_verified: false,
        })
    }
}

fn required_fields(request: &VerifyPaymentRequest) -> Result<(&str, &str, &str), ServiceError> {
    let order_id = present(&request.razorpay_order_id);
    let payment_id = present(&request.razorpay_payment_id);
    let signature = present(&request.razorpay_signature);

    match (order_id, payment_id, signature) {
        (Some(o), Some(p), Some(s)) => Ok((o, p, s)),
        _ => {
            let missing = [
                ("razorpay_order_id", order_id),
                ("razorpay_payment_id", payment_id),
                ("razorpay_signature", signature),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
            Err(ServiceError::MissingFields(missing))
        }
    }
}

/// The value as submitted, or `None` when absent or blank. Never trimmed:
/// the signature covers the exact strings the checkout posted.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
