pub mod orders;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::orders::{OrderService, OrderSettings},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        settings: OrderSettings,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(db_pool, settings, event_sender)),
        }
    }

    /// Wraps an already configured order service, e.g. one with a fixed clock.
    pub fn from_order_service(orders: OrderService) -> Self {
        Self {
            orders: Arc::new(orders),
        }
    }
}
