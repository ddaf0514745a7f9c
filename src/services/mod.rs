// Order lifecycle
pub mod fulfillment;
pub mod orders;

// Payment capture
pub mod payment_gateway;
pub mod payments;
