use async_trait::async_trait;
use larder_shared::OrderEvent;

use crate::StoreResult;

/// Outbound notification sender. Delivery is best effort: callers log a
/// failure and move on, an order is never rolled back because of it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> StoreResult<()>;
}

/// Writes events to the log. Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> StoreResult<()> {
        tracing::info!(
            topic = event.topic(),
            order_id = %event.order_id(),
            customer_id = %event.customer_id(),
            "Order notification"
        );
        Ok(())
    }
}
