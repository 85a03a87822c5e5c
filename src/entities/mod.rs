//! Database entities owned by the marketplace service.

pub mod address;
pub mod coupon;
pub mod coupon_batch;
pub mod coupon_usage;
pub mod neighborhood;
pub mod order;
pub mod order_deletion_audit;
pub mod order_item;
pub mod order_tracking_event;
pub mod pickup_center;
pub mod product;
pub mod product_variant;
pub mod seller;
pub mod seller_order;
pub mod shipping_zone;
pub mod wallet;
pub mod wallet_transaction;
pub mod wishlist_item;
