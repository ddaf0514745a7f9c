use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::{
    CartReader, CatalogLookup, CheckoutRepository, OrderListFilter, OrderPage, OrderRepository,
};
use crate::entities::{cart_item, checkout_detail, order, order_item, product};
use crate::errors::ServiceError;
use crate::models::{
    derive_status, CartLine, Order, OrderItem, OrderStatus, OrderUpdate, PaymentRecord, ProductSnapshot,
    ProgressMap, ShippingAddress, Stage,
};

/// sea-orm backed adapter for Postgres or SQLite
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Loads the items of every header and assembles domain orders in header order
    async fn hydrate(&self, headers: Vec<order::Model>) -> Result<Vec<Order>, ServiceError> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let rows = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::Position)
            .all(self.conn())
            .await?;

        let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for row in rows {
            by_order.entry(row.order_id).or_default().push(row);
        }

        headers
            .into_iter()
            .map(|header| {
                let items = by_order.remove(&header.id).unwrap_or_default();
                order_from_models(header, items)
            })
            .collect()
    }

    async fn load(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        match order::Entity::find_by_id(id).one(self.conn()).await? {
            Some(header) => Ok(self.hydrate(vec![header]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn order_from_models(
    header: order::Model,
    items: Vec<order_item::Model>,
) -> Result<Order, ServiceError> {
    let status = OrderStatus::from_str(&header.status).map_err(|_| {
        ServiceError::SerializationError(format!(
            "Unknown status '{}' stored for order {}",
            header.status, header.id
        ))
    })?;

    let shipping_snapshot = header
        .shipping_snapshot
        .map(serde_json::from_value::<ShippingAddress>)
        .transpose()?;

    let payment = match (header.payment_method, header.gateway_order_id) {
        (Some(method), Some(gateway_order_id)) => Some(PaymentRecord {
            method,
            gateway_order_id,
            gateway_payment_id: header.gateway_payment_id,
            verified: header.payment_verified,
            verified_at: header.payment_verified_at,
        }),
        _ => None,
    };

    let items = items
        .into_iter()
        .map(item_from_model)
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Ok(Order {
        id: header.id,
        owner: header.owner_id,
        items,
        status,
        created_at: header.created_at,
        updated_at: header.updated_at,
        shipping_snapshot,
        payment,
    })
}

fn item_from_model(row: order_item::Model) -> Result<OrderItem, ServiceError> {
    let quantity = u32::try_from(row.quantity).map_err(|_| {
        ServiceError::SerializationError(format!(
            "Invalid quantity {} stored for item {}",
            row.quantity, row.product_id
        ))
    })?;
    Ok(OrderItem {
        product_id: row.product_id,
        quantity,
        unit_price: row.unit_price,
        name: row.name,
        image: row.image,
        progress: serde_json::from_value::<ProgressMap>(row.progress)?,
    })
}

fn apply_payment(active: &mut order::ActiveModel, payment: PaymentRecord) {
    active.payment_method = Set(Some(payment.method));
    active.gateway_order_id = Set(Some(payment.gateway_order_id));
    active.gateway_payment_id = Set(payment.gateway_payment_id);
    active.payment_verified = Set(payment.verified);
    active.payment_verified_at = Set(payment.verified_at);
}

#[async_trait]
impl OrderRepository for SeaOrmStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order) -> Result<(), ServiceError> {
        let shipping_snapshot = order
            .shipping_snapshot
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let mut header = order::ActiveModel {
            id: Set(order.id),
            owner_id: Set(order.owner.clone()),
            status: Set(order.status.to_string()),
            shipping_snapshot: Set(shipping_snapshot),
            payment_method: Set(None),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            payment_verified: Set(false),
            payment_verified_at: Set(None),
            created_at: Set(order.created_at),
            updated_at: Set(order.updated_at),
        };
        if let Some(payment) = order.payment.clone() {
            apply_payment(&mut header, payment);
        }

        let mut rows = Vec::with_capacity(order.items.len());
        for (position, item) in order.items.iter().enumerate() {
            rows.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                position: Set(position as i32),
                product_id: Set(item.product_id.clone()),
                quantity: Set(i32::try_from(item.quantity).map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "Quantity {} is out of range",
                        item.quantity
                    ))
                })?),
                unit_price: Set(item.unit_price),
                name: Set(item.name.clone()),
                image: Set(item.image.clone()),
                progress: Set(serde_json::to_value(&item.progress)?),
                created_at: Set(order.created_at),
            });
        }

        let txn = self.conn().begin().await?;
        header.insert(&txn).await?;
        order_item::Entity::insert_many(rows).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn find_orders_by_owner(&self, owner: &str) -> Result<Vec<Order>, ServiceError> {
        let headers = order::Entity::find()
            .filter(order::Column::OwnerId.eq(owner))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.conn())
            .await?;
        self.hydrate(headers).await
    }

    async fn find_order_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        self.load(id).await
    }

    async fn find_order_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, ServiceError> {
        let header = order::Entity::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(self.conn())
            .await?;
        match header {
            Some(header) => Ok(self.hydrate(vec![header]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderListFilter) -> Result<OrderPage, ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status.to_string()));
        }

        let paginator = query.paginate(self.conn(), filter.limit.max(1));
        let total = paginator.num_items().await?;
        let headers = paginator.fetch_page(filter.page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders: self.hydrate(headers).await?,
            total,
        })
    }

    #[instrument(skip(self, update))]
    async fn update_order(&self, id: Uuid, update: OrderUpdate) -> Result<Order, ServiceError> {
        let header = order::Entity::find_by_id(id)
            .one(self.conn())
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;

        let mut active = header.into_active_model();
        if let Some(status) = update.status {
            active.status = Set(status.to_string());
        }
        if let Some(payment) = update.payment {
            apply_payment(&mut active, payment);
        }
        active.updated_at = Set(Utc::now());
        active.update(self.conn()).await?;

        self.load(id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    async fn update_item_progress(
        &self,
        id: Uuid,
        product_id: &str,
        stage: Stage,
        at: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let txn = self.conn().begin().await?;

        // Row lock on the header serializes stage marks on the same order
        let header = order::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;

        let rows = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::Position)
            .all(&txn)
            .await?;
        let mut items = rows
            .iter()
            .cloned()
            .map(item_from_model)
            .collect::<Result<Vec<_>, ServiceError>>()?;
        let position = items
            .iter()
            .position(|item| item.product_id == product_id)
            .ok_or_else(|| ServiceError::ItemNotFound {
                order_id: id.to_string(),
                product_id: product_id.to_string(),
            })?;
        items[position].progress.insert(stage, at);

        let mut row = rows[position].clone().into_active_model();
        row.progress = Set(serde_json::to_value(&items[position].progress)?);
        row.update(&txn).await?;

        let mut header = header.into_active_model();
        if let Some(status) = derive_status(&items) {
            header.status = Set(status.to_string());
        }
        header.updated_at = Set(at);
        header.update(&txn).await?;

        txn.commit().await?;

        self.load(id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))
    }
}

#[async_trait]
impl CheckoutRepository for SeaOrmStore {
    async fn upsert_shipping_snapshot(
        &self,
        owner: &str,
        address: &ShippingAddress,
    ) -> Result<(), ServiceError> {
        let model = checkout_detail::ActiveModel {
            owner_id: Set(owner.to_string()),
            address: Set(serde_json::to_value(address)?),
            updated_at: Set(Utc::now()),
        };
        checkout_detail::Entity::insert(model)
            .on_conflict(
                OnConflict::column(checkout_detail::Column::OwnerId)
                    .update_columns([
                        checkout_detail::Column::Address,
                        checkout_detail::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.conn())
            .await?;
        Ok(())
    }

    async fn latest_shipping_snapshot(
        &self,
        owner: &str,
    ) -> Result<Option<ShippingAddress>, ServiceError> {
        checkout_detail::Entity::find_by_id(owner.to_string())
            .one(self.conn())
            .await?
            .map(|row| serde_json::from_value(row.address).map_err(ServiceError::from))
            .transpose()
    }
}

#[async_trait]
impl CatalogLookup for SeaOrmStore {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, ServiceError> {
        Ok(product::Entity::find_by_id(product_id.to_string())
            .one(self.conn())
            .await?
            .map(|row| ProductSnapshot {
                name: row.name,
                price: row.price,
                image: row.image,
            }))
    }
}

#[async_trait]
impl CartReader for SeaOrmStore {
    async fn get_cart(&self, owner: &str) -> Result<Vec<CartLine>, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::OwnerId.eq(owner))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.conn())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                u32::try_from(row.quantity).ok().map(|quantity| CartLine {
                    product_id: row.product_id,
                    quantity,
                })
            })
            .collect())
    }

    async fn clear_cart(&self, owner: &str) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::OwnerId.eq(owner))
            .exec(self.conn())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::models::OrderStatus;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    async fn store() -> SeaOrmStore {
        // One connection so every query sees the same in-memory database
        let config = DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SeaOrmStore::new(Arc::new(pool))
    }

    fn sample_order(owner: &str) -> Order {
        let now = Utc::now();
        let mut progress = ProgressMap::new();
        progress.insert(Stage::Placed, now);
        Order {
            id: Uuid::new_v4(),
            owner: owner.into(),
            items: vec![
                OrderItem {
                    product_id: "saree-kanjivaram".into(),
                    quantity: 2,
                    unit_price: dec!(500.00),
                    name: "Kanjivaram Silk".into(),
                    image: Some("/img/kanjivaram.jpg".into()),
                    progress: progress.clone(),
                },
                OrderItem {
                    product_id: "saree-banarasi".into(),
                    quantity: 1,
                    unit_price: dec!(1200.00),
                    name: "Banarasi".into(),
                    image: None,
                    progress,
                },
            ],
            status: OrderStatus::Placed,
            created_at: now,
            updated_at: now,
            shipping_snapshot: None,
            payment: None,
        }
    }

    #[tokio::test]
    async fn insert_and_reload_preserves_items_in_order() {
        let store = store().await;
        let order = sample_order("alice");
        store.insert_order(&order).await.unwrap();

        let loaded = store.find_order_by_id(order.id).await.unwrap().unwrap();
        let product_ids: Vec<&str> = loaded.items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(product_ids, vec!["saree-kanjivaram", "saree-banarasi"]);
        assert_eq!(loaded.total(), dec!(2200));
        assert_eq!(loaded.status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn item_progress_update_is_scoped_to_one_row() {
        let store = store().await;
        let order = sample_order("alice");
        store.insert_order(&order).await.unwrap();

        let updated = store
            .update_item_progress(order.id, "saree-banarasi", Stage::Dispatched, Utc::now())
            .await
            .unwrap();
        assert!(updated
            .item("saree-banarasi")
            .unwrap()
            .progress
            .contains_key(&Stage::Dispatched));
        assert!(!updated
            .item("saree-kanjivaram")
            .unwrap()
            .progress
            .contains_key(&Stage::Dispatched));
        assert_eq!(updated.status, OrderStatus::Dispatched);

        // A lower stage on the other item leaves the derived status alone
        let updated = store
            .update_item_progress(order.id, "saree-kanjivaram", Stage::Placed, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Dispatched);
        let reloaded = store.find_order_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Dispatched);

        let missing = store
            .update_item_progress(order.id, "nope", Stage::Dispatched, Utc::now())
            .await;
        assert_matches!(missing, Err(ServiceError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn payment_fields_round_trip_through_gateway_lookup() {
        let store = store().await;
        let order = sample_order("alice");
        store.insert_order(&order).await.unwrap();
        store
            .update_order(
                order.id,
                OrderUpdate {
                    status: Some(OrderStatus::PendingPayment),
                    payment: Some(PaymentRecord::pending("razorpay", "order_DB1")),
                },
            )
            .await
            .unwrap();

        let found = store
            .find_order_by_gateway_order_id("order_DB1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(found.status, OrderStatus::PendingPayment);
        assert!(!found.payment.unwrap().verified);
    }

    #[tokio::test]
    async fn shipping_snapshot_upsert_overwrites() {
        let store = store().await;
        let mut address = ShippingAddress {
            full_name: "Meera Iyer".into(),
            phone: "9876543210".into(),
            line1: "12 Temple Street".into(),
            line2: None,
            city: "Chennai".into(),
            state: "Tamil Nadu".into(),
            postal_code: "600004".into(),
            country: "IN".into(),
        };
        store.upsert_shipping_snapshot("alice", &address).await.unwrap();
        address.city = "Madurai".into();
        store.upsert_shipping_snapshot("alice", &address).await.unwrap();

        let latest = store.latest_shipping_snapshot("alice").await.unwrap().unwrap();
        assert_eq!(latest.city, "Madurai");
    }
}
