//! Order-creation and settlement services.
//!
//! Everything that takes part in order creation is generic over
//! `sea_orm::ConnectionTrait` so it runs on the caller's transaction.

use chrono::{DateTime, Utc};

pub mod coupons;
pub mod order_detail;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod seller_split;
pub mod shipping;
pub mod stock;
pub mod tax;
pub mod wallet;

/// Source of "now" for cutoffs, coupon windows and timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
