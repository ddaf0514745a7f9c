use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Fulfillment milestone. Declaration order is precedence order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Placed,
    Dispatched,
    InTransit,
    Shipped,
    OutForDelivery,
    Delivered,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Placed,
        Stage::Dispatched,
        Stage::InTransit,
        Stage::Shipped,
        Stage::OutForDelivery,
        Stage::Delivered,
    ];

    /// Position in the fixed stage sequence
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stages from most to least advanced
    pub fn descending() -> impl Iterator<Item = Stage> {
        Stage::iter().rev()
    }
}

/// Stage name → moment the stage was reached
pub type ProgressMap = BTreeMap<Stage, DateTime<Utc>>;

/// Overall order state
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    /// A gateway order is linked and payment has not been verified yet
    PendingPayment,
    Placed,
    Dispatched,
    InTransit,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl From<Stage> for OrderStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Placed => OrderStatus::Placed,
            Stage::Dispatched => OrderStatus::Dispatched,
            Stage::InTransit => OrderStatus::InTransit,
            Stage::Shipped => OrderStatus::Shipped,
            Stage::OutForDelivery => OrderStatus::OutForDelivery,
            Stage::Delivered => OrderStatus::Delivered,
        }
    }
}

/// Delivery address captured at the checkout step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 6, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 12))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    #[validate(length(equal = 2))]
    pub country: String,
}

fn default_country() -> String {
    "IN".to_string()
}

/// Payment capture record attached to an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub method: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Record for a freshly created, not yet paid, gateway order
    pub fn pending(method: impl Into<String>, gateway_order_id: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: None,
            verified: false,
            verified_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    #[schema(value_type = String, example = "1250.00")]
    pub unit_price: Decimal,
    pub name: String,
    pub image: Option<String>,
    #[schema(value_type = Object)]
    pub progress: ProgressMap,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub owner: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipping_snapshot: Option<ShippingAddress>,
    pub payment: Option<PaymentRecord>,
}

impl Order {
    /// Sum of snapshotted line totals; live catalog prices never enter this.
    pub fn total(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item(&self, product_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Overall status implied by item progress.
///
/// Walks the stages from most to least advanced and returns the first one any
/// item has reached. Returns `None` when nothing is stamped, in which case the
/// current status is kept.
pub fn derive_status(items: &[OrderItem]) -> Option<OrderStatus> {
    Stage::descending()
        .find(|stage| items.iter().any(|item| item.progress.contains_key(stage)))
        .map(OrderStatus::from)
}

/// Header-level changes; never touches items
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment: Option<PaymentRecord>,
}

/// Catalog data copied into an order line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductSnapshot {
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

/// One line of a user's cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn stage_names_round_trip_through_strum_and_serde() {
        for stage in Stage::iter() {
            let parsed = Stage::from_str(stage.as_ref()).unwrap();
            assert_eq!(parsed, stage);
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
        assert_eq!(Stage::OutForDelivery.to_string(), "out_for_delivery");
        assert!(Stage::from_str("packed").is_err());
    }

    #[test]
    fn stage_order_matches_sequence_index() {
        let indexes: Vec<usize> = Stage::iter().map(Stage::index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
        assert!(Stage::Shipped > Stage::Dispatched);
        assert_eq!(Stage::descending().next(), Some(Stage::Delivered));
    }

    #[test]
    fn progress_map_serializes_with_stage_keys() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut progress = ProgressMap::new();
        progress.insert(Stage::InTransit, at);
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["in_transit"], "2026-03-01T10:00:00Z");
        let back: ProgressMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn total_is_sum_of_snapshotted_lines() {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            owner: "u1".into(),
            items: vec![
                OrderItem {
                    product_id: "p1".into(),
                    quantity: 2,
                    unit_price: dec!(500),
                    name: "Kanjivaram Silk".into(),
                    image: None,
                    progress: ProgressMap::new(),
                },
                OrderItem {
                    product_id: "p2".into(),
                    quantity: 1,
                    unit_price: dec!(1200),
                    name: "Banarasi".into(),
                    image: None,
                    progress: ProgressMap::new(),
                },
            ],
            status: OrderStatus::Placed,
            created_at: now,
            updated_at: now,
            shipping_snapshot: None,
            payment: None,
        };
        assert_eq!(order.total(), dec!(2200));
        assert!(order.item("p2").is_some());
        assert!(order.item("p3").is_none());
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(OrderStatus::PendingPayment.to_string(), "pending_payment");
        assert_eq!(
            OrderStatus::from_str("cancelled").unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(OrderStatus::from(Stage::InTransit), OrderStatus::InTransit);
    }
}
