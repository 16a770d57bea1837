use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: i64,
    pub total_items: i32,
    pub has_backorder: bool,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderStatusChangedEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub old_status: String,
    pub new_status: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentStatusChangedEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub old_payment_status: String,
    pub new_payment_status: String,
    pub timestamp: i64,
}

/// Everything the engine tells the outside world about an order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed(OrderPlacedEvent),
    StatusChanged(OrderStatusChangedEvent),
    PaymentChanged(PaymentStatusChangedEvent),
}

impl OrderEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "orders.placed",
            OrderEvent::StatusChanged(_) => "orders.status_changed",
            OrderEvent::PaymentChanged(_) => "orders.payment_changed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Placed(e) => e.order_id,
            OrderEvent::StatusChanged(e) => e.order_id,
            OrderEvent::PaymentChanged(e) => e.order_id,
        }
    }

    pub fn customer_id(&self) -> Uuid {
        match self {
            OrderEvent::Placed(e) => e.customer_id,
            OrderEvent::StatusChanged(e) => e.customer_id,
            OrderEvent::PaymentChanged(e) => e.customer_id,
        }
    }
}
