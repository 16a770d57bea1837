use larder_core::StoreError;
use uuid::Uuid;

use crate::models::OrderStatus;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid order request: {0}")]
    Validation(String),

    #[error("Customer not found: {0}")]
    UnknownCustomer(Uuid),

    #[error("Customer {0} is pending approval")]
    UnapprovedCustomer(Uuid),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_name: String,
        requested: i32,
        available: i32,
    },

    #[error("No requested product is currently available")]
    NothingAvailable,

    #[error("Stock for product {product_id} changed while reserving {requested} units")]
    ReservationConflict {
        product_id: Uuid,
        requested: i32,
    },

    #[error("Invalid state transition from {from} to {to}")]
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl OrderError {
    /// Whether repeating the same call may succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::ReservationConflict { .. } | OrderError::Persistence(_))
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::UnknownCustomer(_) => "unknown_customer",
            OrderError::UnapprovedCustomer(_) => "unapproved_customer",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::NothingAvailable => "nothing_available",
            OrderError::ReservationConflict { .. } => "reservation_conflict",
            OrderError::IllegalTransition { .. } => "illegal_transition",
            OrderError::Persistence(_) => "persistence",
        }
    }
}
