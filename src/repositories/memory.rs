use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    sort_newest_first, CartReader, CatalogLookup, CheckoutRepository, OrderListFilter, OrderPage,
    OrderRepository,
};
use crate::errors::ServiceError;
use crate::models::{
    derive_status, CartLine, Order, OrderUpdate, ProductSnapshot, ShippingAddress, Stage,
};

/// Process-local backend used for development and tests.
///
/// Each order lives behind its own DashMap shard lock, so a progress write
/// holds the entry guard for the whole read-modify-write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    orders: DashMap<Uuid, Order>,
    checkout: DashMap<String, ShippingAddress>,
    products: DashMap<String, ProductSnapshot>,
    carts: DashMap<String, Vec<CartLine>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog entry
    pub fn put_product(&self, product_id: impl Into<String>, product: ProductSnapshot) {
        self.products.insert(product_id.into(), product);
    }

    pub fn remove_product(&self, product_id: &str) {
        self.products.remove(product_id);
    }

    /// Replaces the cart of `owner`
    pub fn set_cart(&self, owner: impl Into<String>, lines: Vec<CartLine>) {
        self.carts.insert(owner.into(), lines);
    }

    /// Current cart contents of `owner`, empty when none
    pub fn cart_lines(&self, owner: &str) -> Vec<CartLine> {
        self.carts
            .get(owner)
            .map(|lines| lines.value().clone())
            .unwrap_or_default()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), ServiceError> {
        if self.orders.contains_key(&order.id) {
            return Err(ServiceError::InternalError(format!(
                "Order {} already exists",
                order.id
            )));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_orders_by_owner(&self, owner: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.is_owned_by(owner))
            .map(|entry| entry.value().clone())
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_order_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| {
                entry
                    .payment
                    .as_ref()
                    .is_some_and(|p| p.gateway_order_id == gateway_order_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn list_orders(&self, filter: &OrderListFilter) -> Result<OrderPage, ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| filter.status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        sort_newest_first(&mut orders);

        let total = orders.len() as u64;
        let orders = orders
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit as usize)
            .collect();
        Ok(OrderPage { orders, total })
    }

    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> Result<Order, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(payment) = update.payment {
            entry.payment = Some(payment);
        }
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn update_item_progress(
        &self,
        id: Uuid,
        product_id: &str,
        stage: Stage,
        at: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;
        let item = entry
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
            .ok_or_else(|| ServiceError::ItemNotFound {
                order_id: id.to_string(),
                product_id: product_id.to_string(),
            })?;
        item.progress.insert(stage, at);
        if let Some(status) = derive_status(&entry.items) {
            entry.status = status;
        }
        entry.updated_at = at;
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn upsert_shipping_snapshot(
        &self,
        owner: &str,
        address: &ShippingAddress,
    ) -> Result<(), ServiceError> {
        self.checkout.insert(owner.to_string(), address.clone());
        Ok(())
    }

    async fn latest_shipping_snapshot(
        &self,
        owner: &str,
    ) -> Result<Option<ShippingAddress>, ServiceError> {
        Ok(self.checkout.get(owner).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl CatalogLookup for InMemoryStore {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, ServiceError> {
        Ok(self.products.get(product_id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl CartReader for InMemoryStore {
    async fn get_cart(&self, owner: &str) -> Result<Vec<CartLine>, ServiceError> {
        Ok(self
            .carts
            .get(owner)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn clear_cart(&self, owner: &str) -> Result<(), ServiceError> {
        self.carts.remove(owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, OrderStatus, PaymentRecord, ProgressMap};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn order(owner: &str, created_at: DateTime<Utc>) -> Order {
        let mut progress = ProgressMap::new();
        progress.insert(Stage::Placed, created_at);
        let item = |product_id: &str| OrderItem {
            product_id: product_id.into(),
            quantity: 1,
            unit_price: dec!(100),
            name: product_id.to_uppercase(),
            image: None,
            progress: progress.clone(),
        };
        Order {
            id: Uuid::new_v4(),
            owner: owner.into(),
            items: vec![item("p1"), item("p2")],
            status: OrderStatus::Placed,
            created_at,
            updated_at: created_at,
            shipping_snapshot: None,
            payment: None,
        }
    }

    #[tokio::test]
    async fn owner_listing_is_filtered_and_newest_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let older = order("alice", now - Duration::minutes(5));
        let newer = order("alice", now);
        store.insert_order(&older).await.unwrap();
        store.insert_order(&newer).await.unwrap();
        store.insert_order(&order("bob", now)).await.unwrap();

        let orders = store.find_orders_by_owner("alice").await.unwrap();
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn progress_write_touches_only_the_target_item() {
        let store = InMemoryStore::new();
        let created = order("alice", Utc::now());
        store.insert_order(&created).await.unwrap();

        let at = Utc::now();
        let updated = store
            .update_item_progress(created.id, "p2", Stage::Shipped, at)
            .await
            .unwrap();

        assert_eq!(updated.item("p2").unwrap().progress.get(&Stage::Shipped), Some(&at));
        assert!(updated.item("p2").unwrap().progress.contains_key(&Stage::Placed));
        assert!(!updated.item("p1").unwrap().progress.contains_key(&Stage::Shipped));
    }

    #[tokio::test]
    async fn progress_write_reports_missing_order_and_item() {
        let store = InMemoryStore::new();
        let created = order("alice", Utc::now());
        store.insert_order(&created).await.unwrap();

        let missing_order = store
            .update_item_progress(Uuid::new_v4(), "p1", Stage::Dispatched, Utc::now())
            .await;
        assert_matches!(missing_order, Err(ServiceError::OrderNotFound(_)));

        let missing_item = store
            .update_item_progress(created.id, "p9", Stage::Dispatched, Utc::now())
            .await;
        assert_matches!(missing_item, Err(ServiceError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn gateway_lookup_and_header_update() {
        let store = InMemoryStore::new();
        let created = order("alice", Utc::now());
        store.insert_order(&created).await.unwrap();

        assert!(store
            .find_order_by_gateway_order_id("order_X")
            .await
            .unwrap()
            .is_none());

        store
            .update_order(
                created.id,
                OrderUpdate {
                    status: Some(OrderStatus::PendingPayment),
                    payment: Some(PaymentRecord::pending("razorpay", "order_X")),
                },
            )
            .await
            .unwrap();

        let found = store
            .find_order_by_gateway_order_id("order_X")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.status, OrderStatus::PendingPayment);
        assert_eq!(found.items, created.items);
    }

    #[tokio::test]
    async fn list_orders_pages_and_filters_by_status() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for minutes in 0..5 {
            store
                .insert_order(&order("alice", now - Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        let mut cancelled = order("bob", now - Duration::hours(1));
        cancelled.status = OrderStatus::Cancelled;
        store.insert_order(&cancelled).await.unwrap();

        let page = store
            .list_orders(&OrderListFilter {
                status: None,
                page: 2,
                limit: 4,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[1].id, cancelled.id);

        let only_cancelled = store
            .list_orders(&OrderListFilter {
                status: Some(OrderStatus::Cancelled),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(only_cancelled.total, 1);
    }

    #[tokio::test]
    async fn cart_and_checkout_round_trip() {
        let store = InMemoryStore::new();
        store.set_cart(
            "alice",
            vec![CartLine {
                product_id: "p1".into(),
                quantity: 2,
            }],
        );
        assert_eq!(store.get_cart("alice").await.unwrap().len(), 1);
        store.clear_cart("alice").await.unwrap();
        assert!(store.get_cart("alice").await.unwrap().is_empty());
        assert!(store.latest_shipping_snapshot("alice").await.unwrap().is_none());
    }
}
