//! Saree Orders API
//!
//! Order placement, payment capture and per-item fulfillment tracking for the
//! saree storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{inject_auth_service, AuthRouterExt, AuthService, ADMIN_ROLE};
use crate::config::{AppConfig, PersistenceBackend};
use crate::repositories::{InMemoryStore, SeaOrmStore, Stores};
use crate::services::payment_gateway::{PaymentGateway, RazorpayConfig, RazorpayGateway};
use crate::services::payments::PaymentSettings;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    /// Present only with the database backend
    pub db: Option<Arc<DatabaseConnection>>,
}

impl AppState {
    /// Wires services over already-built ports
    pub fn new(
        config: AppConfig,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        db: Option<Arc<DatabaseConnection>>,
    ) -> Self {
        let settings = PaymentSettings {
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            currency: config.payment_currency.clone(),
        };
        let auth = Arc::new(AuthService::new((&config).into()));
        Self {
            services: handlers::AppServices::new(stores, gateway, settings),
            auth,
            db,
            config,
        }
    }

    /// Builds the configured persistence backend and the Razorpay client
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(RazorpayGateway::new(RazorpayConfig::from(&config))?);

        match config.persistence_backend() {
            PersistenceBackend::Database => {
                let pool = db::establish_connection_from_app_config(&config).await?;
                if config.auto_migrate {
                    db::run_migrations(&pool).await?;
                }
                let pool = Arc::new(pool);
                let stores = Stores::from_backend(Arc::new(SeaOrmStore::new(pool.clone())));
                Ok(Self::new(config, stores, gateway, Some(pool)))
            }
            PersistenceBackend::InMemory => {
                let stores = Stores::from_backend(Arc::new(InMemoryStore::new()));
                Ok(Self::new(config, stores, gateway, None))
            }
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


// Versioned API routes
pub fn api_v1_routes() -> Router<AppState> {
    let customer = Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_my_orders),
        )
        .route("/orders/:id", get(handlers::orders::get_my_order))
        .route(
            "/checkout",
            post(handlers::checkout::record_checkout).get(handlers::checkout::get_checkout),
        )
        .route(
            "/payment/create-order",
            post(handlers::payments::create_payment_order),
        )
        .route("/payment/verify", post(handlers::payments::verify_payment))
        .with_auth();

    let admin = Router::new()
        .route(
            "/admin/orders",
            get(handlers::admin_orders::list_all_orders),
        )
        .route(
            "/admin/orders/:id",
            get(handlers::admin_orders::get_any_order).put(handlers::admin_orders::set_order_status),
        )
        .route(
            "/admin/orders/:id/item/:product_id",
            put(handlers::admin_orders::mark_item_stage),
        )
        .with_role(ADMIN_ROLE);

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(customer)
        .merge(admin)
}

/// Full application router: API, docs, auth injection, tracing and request ids
pub fn app_router(state: AppState) -> Router {
    let auth = state.auth.clone();
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(axum::middleware::from_fn_with_state(auth, inject_auth_service))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "saree-orders-api",
        "backend": state.config.persistence_backend().to_string(),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match &state.db {
        Some(db) => match db.ping().await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        None => "not_configured",
    };

    Ok(Json(ApiResponse::success(json!({
        "status": if db_status == "unhealthy" { "degraded" } else { "ok" },
        "database": db_status,
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}
