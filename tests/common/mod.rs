#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use saree_orders_api::{
    app_router,
    auth::ADMIN_ROLE,
    config::AppConfig,
    errors::ServiceError,
    models::{CartLine, ProductSnapshot},
    repositories::{InMemoryStore, Stores},
    services::payment_gateway::{GatewayOrder, GatewayOrderRequest, PaymentGateway},
    AppState,
};
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;

pub const KEY_ID: &str = "rzp_test_harness";
pub const KEY_SECRET: &str = "harness_key_secret";
const JWT_SECRET: &str = "integration-harness-secret-0123456789ab";

/// Gateway double that hands out sequential order ids and records every request
#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicU64,
    pub requests: std::sync::Mutex<Vec<GatewayOrderRequest>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .expect("gateway request log")
            .push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_fake{n}"),
            amount: request.amount,
            currency: request.currency.clone(),
            status: Some("created".to_string()),
        })
    }
}

/// Router over the in-memory backend with a seeded catalog
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        let mut cfg = AppConfig::new(JWT_SECRET.to_string(), "test".to_string());
        cfg.razorpay_key_id = Some(KEY_ID.to_string());
        cfg.razorpay_key_secret = Some(KEY_SECRET.to_string());

        let store = Arc::new(InMemoryStore::new());
        store.put_product("p1", product("Kanjivaram Silk", Decimal::new(500, 0)));
        store.put_product("p2", product("Banarasi Georgette", Decimal::new(1200, 0)));
        store.put_product("p3", product("Chanderi Cotton", Decimal::new(75050, 2)));

        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(cfg, Stores::from_backend(store.clone()), gateway.clone(), None);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            store,
            gateway,
        }
    }

    pub fn set_cart(&self, owner: &str, lines: &[(&str, u32)]) {
        self.store.set_cart(
            owner,
            lines
                .iter()
                .map(|(product_id, quantity)| CartLine {
                    product_id: product_id.to_string(),
                    quantity: *quantity,
                })
                .collect(),
        );
    }

    pub fn customer_token(&self, user: &str) -> String {
        self.state
            .auth
            .issue_token(user, &["customer"], chrono::Duration::hours(1))
            .expect("customer token")
    }

    pub fn admin_token(&self) -> String {
        self.state
            .auth
            .issue_token("admin-1", &[ADMIN_ROLE], chrono::Duration::hours(1))
            .expect("admin token")
    }

    /// Sends a request and returns the status and decoded JSON body (Null when empty)
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, body, token).await;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router is infallible")
    }

    /// Sends a bodyless request carrying one extra header
    pub async fn send_with_header(
        &self,
        method: Method,
        uri: &str,
        name: &str,
        value: &str,
    ) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(name, value)
            .body(Body::empty())
            .expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Places an order from the current cart of `user` and returns its id
    pub async fn place_cart_order(&self, user: &str) -> String {
        let token = self.customer_token(user);
        let (status, body) = self
            .request(Method::POST, "/api/v1/orders", Some(serde_json::json!({})), Some(&token))
            .await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
        body["data"]["id"].as_str().expect("order id").to_string()
    }
}

fn product(name: &str, price: Decimal) -> ProductSnapshot {
    ProductSnapshot {
        name: name.to_string(),
        price,
        image: Some(format!("/images/{}.jpg", name.to_lowercase().replace(' ', "-"))),
    }
}

/// Checkout-widget style signature over `"{order}|{payment}"`
pub fn sign(gateway_order_id: &str, gateway_payment_id: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{gateway_order_id}|{gateway_payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
