use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::repositories::Stores;
use crate::services::{
    fulfillment::FulfillmentService,
    orders::OrderService,
    payment_gateway::PaymentGateway,
    payments::{PaymentService, PaymentSettings},
};

pub mod admin_orders;
pub mod checkout;
pub mod extract;
pub mod orders;
pub mod payments;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppServices {
    pub order: Arc<OrderService>,
    pub fulfillment: Arc<FulfillmentService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        payment_settings: PaymentSettings,
    ) -> Self {
        Self {
            order: Arc::new(OrderService::new(stores.clone())),
            fulfillment: Arc::new(FulfillmentService::new(stores.orders.clone())),
            payments: Arc::new(PaymentService::new(
                stores.orders,
                gateway,
                payment_settings,
            )),
        }
    }
}

/// Path ids that are not UUIDs cannot name an order
pub(crate) fn parse_order_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::OrderNotFound(raw.to_string()))
}
