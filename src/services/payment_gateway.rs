use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Order creation request in the gateway's own units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Amount in minor units (paise for INR)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Remote payment gateway. Only order creation goes over the network;
/// signature checks are local (see [`verify_signature`]).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &GatewayOrderRequest)
        -> Result<GatewayOrder, ServiceError>;
}

/// Converts a major-unit amount to integer minor units.
///
/// Half-way values round away from zero. Non-positive amounts, and amounts
/// that round to zero, are rejected.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidAmount(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    let minor = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|scaled| scaled.to_i64())
        .filter(|minor| *minor > 0)
        .ok_or_else(|| ServiceError::InvalidAmount(format!("amount {} is out of range", amount)))?;
    Ok(minor)
}

/// Checks a checkout signature: lowercase hex HMAC-SHA256 of
/// `"{gateway_order_id}|{gateway_payment_id}"` keyed by the key secret.
pub fn verify_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Razorpay credentials and endpoint
#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&AppConfig> for RazorpayConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            key_id: cfg.razorpay_key_id.clone(),
            key_secret: cfg.razorpay_key_secret.clone(),
            base_url: cfg.razorpay_base_url.clone(),
            timeout: Duration::from_secs(cfg.payment_gateway_timeout_secs),
        }
    }
}

/// Razorpay Orders API client
#[derive(Clone)]
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build gateway client: {}", e))
            })?;
        Ok(Self { config, client })
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let (Some(key_id), Some(key_secret)) =
            (self.config.key_id.as_deref(), self.config.key_secret.as_deref())
        else {
            warn!("Razorpay credentials are not configured");
            return Err(ServiceError::GatewayUnavailable(
                "gateway credentials are not configured".to_string(),
            ));
        };

        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(key_id, Some(key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!("Razorpay request failed: {}", e);
                ServiceError::GatewayUnavailable(format!("gateway request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Razorpay rejected order creation: {}", body);
            return Err(ServiceError::GatewayUnavailable(format!(
                "gateway responded with {}",
                status
            )));
        }

        response.json::<GatewayOrder>().await.map_err(|e| {
            warn!("Razorpay response could not be decoded: {}", e);
            ServiceError::GatewayUnavailable(format!("undecodable gateway response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "rzp_test_secret";

    fn sign(message: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn gateway(base_url: &str, with_credentials: bool) -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig {
            key_id: with_credentials.then(|| "rzp_test_key".to_string()),
            key_secret: with_credentials.then(|| SECRET.to_string()),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn request() -> GatewayOrderRequest {
        GatewayOrderRequest {
            amount: 220000,
            currency: "INR".into(),
            receipt: "rcpt_1".into(),
        }
    }

    #[test]
    fn minor_units_round_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(2200)).unwrap(), 220000);
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert_matches!(to_minor_units(dec!(0)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(to_minor_units(dec!(-5)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(to_minor_units(dec!(0.001)), Err(ServiceError::InvalidAmount(_)));
    }

    #[test]
    fn oversized_amounts_are_rejected_without_overflowing() {
        assert_matches!(to_minor_units(Decimal::MAX), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(
            to_minor_units(dec!(100000000000000000000)),
            Err(ServiceError::InvalidAmount(_))
        );
    }

    #[test]
    fn signature_matches_hmac_of_joined_ids() {
        let signature = sign("orderABC|payXYZ", SECRET);
        assert!(verify_signature("orderABC", "payXYZ", &signature, SECRET));
        assert!(!verify_signature("orderABC", "payXYZ", &signature, "other_secret"));
        assert!(!verify_signature("orderABD", "payXYZ", &signature, SECRET));
        assert!(!verify_signature("orderABC", "payXYZ", &signature.to_uppercase(), SECRET));
        assert!(!verify_signature("orderABC", "payXYZ", "", SECRET));
    }

    proptest! {
        #[test]
        fn any_single_character_change_is_rejected(
            order_id in "[a-zA-Z0-9_]{1,20}",
            payment_id in "[a-zA-Z0-9_]{1,20}",
            position in 0usize..64,
            replacement in "[0-9a-f]",
        ) {
            let signature = sign(&format!("{}|{}", order_id, payment_id), SECRET);
            prop_assert!(verify_signature(&order_id, &payment_id, &signature, SECRET));

            let mut chars: Vec<char> = signature.chars().collect();
            let replacement = replacement.chars().next().unwrap();
            prop_assume!(chars[position] != replacement);
            chars[position] = replacement;
            let tampered: String = chars.into_iter().collect();
            prop_assert!(!verify_signature(&order_id, &payment_id, &tampered, SECRET));
        }
    }

    #[tokio::test]
    async fn create_order_posts_to_orders_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(basic_auth("rzp_test_key", SECRET))
            .and(body_json(json!({"amount": 220000, "currency": "INR", "receipt": "rcpt_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_Gw123",
                "entity": "order",
                "amount": 220000,
                "currency": "INR",
                "receipt": "rcpt_1",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = gateway(&server.uri(), true)
            .create_order(&request())
            .await
            .unwrap();
        assert_eq!(order.id, "order_Gw123");
        assert_eq!(order.amount, 220000);
        assert_eq!(order.status.as_deref(), Some("created"));
    }

    #[tokio::test]
    async fn non_success_status_is_gateway_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server.uri(), true).create_order(&request()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_gateway_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = gateway(&server.uri(), true).create_order(&request()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_credentials_never_reach_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = gateway(&server.uri(), false).create_order(&request()).await;
        assert_matches!(result, Err(ServiceError::GatewayUnavailable(_)));
    }
}
