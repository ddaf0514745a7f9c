pub mod cart_item;
pub mod checkout_detail;
pub mod order;
pub mod order_item;
pub mod product;
