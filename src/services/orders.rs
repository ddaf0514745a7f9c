use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{
    CartLine, Order, OrderItem, OrderStatus, OrderUpdate, ProgressMap, ShippingAddress, Stage,
};
use crate::repositories::{OrderListFilter, OrderPage, Stores};

/// One explicitly requested line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    #[validate(length(min = 1, max = 64, message = "productId is required"))]
    pub product_id: String,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: i64,
}

/// Body of `POST /orders`. Without items the caller's cart is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Option<Vec<OrderLineRequest>>,
}

/// Order creation, checkout snapshots and order queries
#[derive(Clone)]
pub struct OrderService {
    stores: Stores,
}

impl OrderService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Builds an order from explicit lines or the owner's cart, snapshots
    /// catalog data into it, persists it and then empties the cart.
    #[instrument(skip(self, request), fields(owner = %owner))]
    pub async fn create_order(
        &self,
        owner: &str,
        request: CreateOrderRequest,
    ) -> Result<Order, ServiceError> {
        let explicit = request.items.unwrap_or_default();
        let lines = if explicit.is_empty() {
            self.stores.cart.get_cart(owner).await?
        } else {
            explicit
                .into_iter()
                .map(|mut line| {
                    // Blank ids must fail the length check
                    line.product_id = line.product_id.trim().to_string();
                    line.validate()?;
                    Ok::<_, ServiceError>(CartLine {
                        product_id: line.product_id,
                        quantity: line.quantity as u32,
                    })
                })
                .collect::<Result<Vec<_>, ServiceError>>()?
        };

        let lines = consolidate(lines);
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let snapshot = self.stores.catalog.get_product(&line.product_id).await?;
            if snapshot.is_none() {
                warn!(product_id = %line.product_id, "Product missing from catalog; snapshotting zero price");
            }
            let snapshot = snapshot.unwrap_or_default();
            let mut progress = ProgressMap::new();
            progress.insert(Stage::Placed, now);
            items.push(OrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: snapshot.price,
                name: snapshot.name,
                image: snapshot.image,
                progress,
            });
        }

        let order = Order {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            items,
            status: OrderStatus::Placed,
            created_at: now,
            updated_at: now,
            shipping_snapshot: self.stores.checkout.latest_shipping_snapshot(owner).await?,
            payment: None,
        };

        self.stores.orders.insert_order(&order).await?;
        counter!("saree_orders.orders.created", 1);
        info!(order_id = %order.id, items = order.items.len(), total = %order.total(), "Order created");

        if let Err(e) = self.stores.cart.clear_cart(owner).await {
            warn!(order_id = %order.id, error = %e, "Order created but cart could not be cleared");
        }

        Ok(order)
    }

    /// Replaces the owner's latest shipping address
    #[instrument(skip(self, address), fields(owner = %owner))]
    pub async fn record_checkout_details(
        &self,
        owner: &str,
        mut address: ShippingAddress,
    ) -> Result<ShippingAddress, ServiceError> {
        address.country = address.country.trim().to_uppercase();
        address.validate()?;
        self.stores
            .checkout
            .upsert_shipping_snapshot(owner, &address)
            .await?;
        Ok(address)
    }

    pub async fn latest_checkout_details(
        &self,
        owner: &str,
    ) -> Result<Option<ShippingAddress>, ServiceError> {
        self.stores.checkout.latest_shipping_snapshot(owner).await
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<Order>, ServiceError> {
        self.stores.orders.find_orders_by_owner(owner).await
    }

    /// Another owner's order is reported as missing
    pub async fn get_for_owner(&self, owner: &str, id: Uuid) -> Result<Order, ServiceError> {
        self.stores
            .orders
            .find_order_by_id(id)
            .await?
            .filter(|order| order.is_owned_by(owner))
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }

    pub async fn list_all(&self, filter: &OrderListFilter) -> Result<OrderPage, ServiceError> {
        self.stores.orders.list_orders(filter).await
    }

    pub async fn get_any(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.stores
            .orders
            .find_order_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }

    /// Admin override. Item progress is not touched.
    #[instrument(skip(self))]
    pub async fn set_status(&self, id: Uuid, raw: Option<&str>) -> Result<Order, ServiceError> {
        let status = parse_status(raw)?;
        let order = self
            .stores
            .orders
            .update_order(
                id,
                OrderUpdate {
                    status: Some(status),
                    payment: None,
                },
            )
            .await?;
        info!(order_id = %id, status = %status, "Order status overridden");
        Ok(order)
    }
}

pub fn parse_status(raw: Option<&str>) -> Result<OrderStatus, ServiceError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("status is required".to_string()))?;
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("unknown status '{}'", raw)))
}

/// Merges lines for the same product, keeping the first position
fn consolidate(lines: Vec<CartLine>) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines.into_iter().filter(|l| l.quantity > 0) {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(line),
        }
    }
    merged
}
