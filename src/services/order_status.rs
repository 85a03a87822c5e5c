//! Order lifecycle.
//!
//! ```text
//! pending_payment -> confirmed -> processing -> out_for_delivery -> delivered -> refunded
//!        \______________\______________\_______________\
//!                                                        -> cancelled
//! ```
//!
//! Forward moves may skip steps. `cancelled` is reachable from any state
//! before `delivered`; `refunded` only from `delivered`.

use crate::{
    entities::order::{OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
};

impl OrderStatus {
    /// Parses canonical names and the legacy vocabulary still found in older
    /// clients and rows.
    pub fn normalize(raw: &str) -> Option<Self> {
        let status = match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "pending_payment" | "pending" => OrderStatus::PendingPayment,
            "confirmed" | "paid" | "payment_completed" => OrderStatus::Confirmed,
            "processing" | "preparing" | "packed" => OrderStatus::Processing,
            "out_for_delivery" | "shipped" | "in_transit" | "dispatched" => {
                OrderStatus::OutForDelivery
            }
            "delivered" | "completed" | "fulfilled" => OrderStatus::Delivered,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "refunded" | "returned" => OrderStatus::Refunded,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Position on the main chain; side branches have none.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::PendingPayment => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::OutForDelivery => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled | OrderStatus::Refunded => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Not yet handed to a courier.
    pub fn is_cancellable_by_buyer(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment | OrderStatus::Confirmed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    match (from, to) {
        (OrderStatus::Cancelled | OrderStatus::Refunded, _) => false,
        (OrderStatus::Delivered, OrderStatus::Refunded) => true,
        (_, OrderStatus::Refunded) => false,
        (OrderStatus::Delivered, _) => false,
        (_, OrderStatus::Cancelled) => true,
        _ => match (from.rank(), to.rank()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        },
    }
}

/// `Ok(false)` when `from == to`, which callers treat as a no-op.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<bool, ServiceError> {
    if from == to {
        return Ok(false);
    }
    if can_transition(from, to) {
        Ok(true)
    } else {
        Err(ServiceError::InvalidTransition(format!(
            "cannot move an order from {} to {}",
            from, to
        )))
    }
}

/// Order facts the side effects depend on.
#[derive(Debug, Clone, Copy)]
pub struct OrderFlags {
    pub stock_reduced: bool,
    pub revenue_credited: bool,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
}

/// Work a transition owes, decided before anything is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    pub reduce_stock: bool,
    pub restore_stock: bool,
    pub credit_revenue: bool,
    pub reverse_revenue: bool,
    pub refund_wallet: bool,
    pub mark_paid: bool,
    pub mark_refunded: bool,
}

pub fn transition_effects(from: OrderStatus, to: OrderStatus, flags: OrderFlags) -> TransitionEffects {
    let mut effects = TransitionEffects::default();
    if from == to {
        return effects;
    }
    let paid_from_wallet =
        flags.payment_method == PaymentMethod::StoredBalance && flags.payment_status == PaymentStatus::Paid;

    match to {
        OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::OutForDelivery => {
            effects.reduce_stock = !flags.stock_reduced;
        }
        OrderStatus::Delivered => {
            effects.reduce_stock = !flags.stock_reduced;
            effects.credit_revenue = !flags.revenue_credited;
            effects.mark_paid = flags.payment_status == PaymentStatus::Pending;
        }
        OrderStatus::Cancelled => {
            effects.restore_stock = flags.stock_reduced;
            effects.refund_wallet = paid_from_wallet;
            effects.mark_refunded = flags.payment_status == PaymentStatus::Paid;
        }
        OrderStatus::Refunded => {
            effects.reverse_revenue = flags.revenue_credited;
            effects.refund_wallet = paid_from_wallet;
            effects.mark_refunded = flags.payment_status == PaymentStatus::Paid;
        }
        OrderStatus::PendingPayment => {}
    }
    effects
}
