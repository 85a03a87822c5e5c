use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Buyer(Uuid),
    Seller(Uuid),
    Admins,
}

/// Things that happened to orders, for notification delivery, email and
/// analytics. Produced after the owning transaction has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        buyer_id: Uuid,
        seller_ids: Vec<Uuid>,
        total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        reference: String,
    },
    OrderCancelled(Uuid),
    OrderDeleted {
        order_id: Uuid,
        order_number: String,
        deleted_by: Uuid,
    },
    NotificationRequested {
        recipient: Recipient,
        order_id: Uuid,
        title: String,
    },
    ConfirmationEmailRequested {
        buyer_id: Uuid,
        order_id: Uuid,
        order_number: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Best-effort send; a closed or full channel is logged and ignored.
    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "dropping event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processing loop started");
    while let Some(event) = rx.recv().await {
        let received_at: DateTime<Utc> = Utc::now();
        match event {
            Event::OrderCreated {
                order_id,
                order_number,
                buyer_id,
                seller_ids,
                total,
            } => {
                info!(%order_id, %order_number, %buyer_id, sellers = seller_ids.len(), %total, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::PaymentConfirmed { order_id, reference } => {
                info!(%order_id, %reference, "payment confirmed");
            }
            Event::OrderCancelled(order_id) => {
                info!(%order_id, "order cancelled");
            }
            Event::OrderDeleted {
                order_id,
                order_number,
                deleted_by,
            } => {
                warn!(%order_id, %order_number, %deleted_by, "order deleted");
            }
            Event::NotificationRequested {
                recipient,
                order_id,
                title,
            } => {
                info!(?recipient, %order_id, %title, %received_at, "notification queued");
            }
            Event::ConfirmationEmailRequested {
                buyer_id,
                order_id,
                order_number,
            } => {
                info!(%buyer_id, %order_id, %order_number, "confirmation email queued");
            }
        }
    }
    warn!("Event processing loop has ended");
}
