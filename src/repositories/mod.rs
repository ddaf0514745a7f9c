//! Persistence port and collaborator ports.
//!
//! Services only see these traits. The backend behind them is picked once at
//! startup (`database` or `memory`) and never inspected again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    CartLine, Order, OrderStatus, OrderUpdate, ProductSnapshot, ShippingAddress, Stage,
};

pub mod database;
pub mod memory;

pub use database::SeaOrmStore;
pub use memory::InMemoryStore;

/// Admin list parameters. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub page: u64,
    pub limit: u64,
}

impl Default for OrderListFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

impl OrderListFilter {
    pub(crate) fn offset(&self) -> usize {
        (self.page.saturating_sub(1) * self.limit) as usize
    }
}

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), ServiceError>;

    /// Every order of `owner`, newest first
    async fn find_orders_by_owner(&self, owner: &str) -> Result<Vec<Order>, ServiceError>;

    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn find_order_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, ServiceError>;

    /// All orders matching the filter, newest first
    async fn list_orders(&self, filter: &OrderListFilter) -> Result<OrderPage, ServiceError>;

    /// Applies header changes and touches `updated_at`
    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> Result<Order, ServiceError>;

    /// Stamps `stage` on a single item and re-derives the order status from item
    /// progress in the same atomic write. Other items and other stages are left alone.
    async fn update_item_progress(
        &self,
        id: Uuid,
        product_id: &str,
        stage: Stage,
        at: DateTime<Utc>,
    ) -> Result<Order, ServiceError>;
}

#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    /// Replaces any previous snapshot for `owner`
    async fn upsert_shipping_snapshot(
        &self,
        owner: &str,
        address: &ShippingAddress,
    ) -> Result<(), ServiceError>;

    async fn latest_shipping_snapshot(
        &self,
        owner: &str,
    ) -> Result<Option<ShippingAddress>, ServiceError>;
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, ServiceError>;
}

#[async_trait]
pub trait CartReader: Send + Sync {
    async fn get_cart(&self, owner: &str) -> Result<Vec<CartLine>, ServiceError>;
    async fn clear_cart(&self, owner: &str) -> Result<(), ServiceError>;
}

/// The set of ports wired into the services
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderRepository>,
    pub checkout: Arc<dyn CheckoutRepository>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub cart: Arc<dyn CartReader>,
}

impl Stores {
    /// Uses one adapter for every port
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: OrderRepository + CheckoutRepository + CatalogLookup + CartReader + 'static,
    {
        Self {
            orders: backend.clone(),
            checkout: backend.clone(),
            catalog: backend.clone(),
            cart: backend,
        }
    }
}

pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
