use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the stock and bill books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    /// Stock dropped to or below the low-stock threshold
    StockLow {
        product_id: Uuid,
        product_name: String,
        quantity: i32,
    },
    BillCreated {
        bill_id: Uuid,
        total_amount: Decimal,
        item_count: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting. A full or closed channel drops the
    /// event with a warning; callers never fail because of it.
    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Drains the channel and logs each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ProductCreated(id) => info!(product_id = %id, "Product created"),
            Event::ProductUpdated(id) => info!(product_id = %id, "Product updated"),
            Event::ProductDeleted(id) => info!(product_id = %id, "Product deleted"),
            Event::StockLow {
                product_id,
                product_name,
                quantity,
            } => warn!(
                product_id = %product_id,
                product_name = %product_name,
                quantity,
                "Stock is running low"
            ),
            Event::BillCreated {
                bill_id,
                total_amount,
                item_count,
            } => info!(
                bill_id = %bill_id,
                total_amount = %total_amount,
                item_count,
                "Bill created"
            ),
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_never_blocks_on_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        sender.send_or_log(Event::ProductCreated(id));
        sender.send_or_log(Event::ProductDeleted(id));

        assert_eq!(rx.recv().await, Some(Event::ProductCreated(id)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn process_events_ends_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::ProductUpdated(Uuid::new_v4()));
        drop(sender);

        process_events(rx).await;
    }
}
