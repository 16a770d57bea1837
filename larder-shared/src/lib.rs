pub mod models;
pub mod pii;

pub use models::events::{OrderEvent, OrderPlacedEvent, OrderStatusChangedEvent, PaymentStatusChangedEvent};
pub use pii::Masked;
