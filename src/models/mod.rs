pub mod order;

pub use order::{
    derive_status, CartLine, Order, OrderItem, OrderStatus, OrderUpdate, PaymentRecord, ProductSnapshot,
    ProgressMap, ShippingAddress, Stage,
};
