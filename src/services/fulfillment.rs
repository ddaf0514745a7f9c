use chrono::Utc;
use metrics::counter;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Order, Stage};
use crate::repositories::OrderRepository;

pub use crate::models::derive_status;

/// Parses a stage name coming off the wire
pub fn parse_stage(raw: Option<&str>) -> Result<Stage, ServiceError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("stage is required".to_string()))?;
    Stage::from_str(raw).map_err(|_| ServiceError::InvalidStage(raw.to_string()))
}

/// Admin-side progress updates
#[derive(Clone)]
pub struct FulfillmentService {
    orders: Arc<dyn OrderRepository>,
}

impl FulfillmentService {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// Stamps `stage` on one item and recomputes the order status
    #[instrument(skip(self), fields(stage = %stage))]
    pub async fn mark_item_stage(
        &self,
        order_id: Uuid,
        product_id: &str,
        stage: Stage,
    ) -> Result<Order, ServiceError> {
        let existing = self
            .orders
            .find_order_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        if existing.item(product_id).is_none() {
            return Err(ServiceError::ItemNotFound {
                order_id: order_id.to_string(),
                product_id: product_id.to_string(),
            });
        }

        // The adapter re-derives the status in the same write as the stamp
        let updated = self
            .orders
            .update_item_progress(order_id, product_id, stage, Utc::now())
            .await?;
        counter!("saree_orders.fulfillment.stages_marked", 1);

        if updated.status != existing.status {
            info!(
                order_id = %order_id,
                from = %existing.status,
                to = %updated.status,
                "Order status advanced from item progress"
            );
        }
        Ok(updated)
    }
}
