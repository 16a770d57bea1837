pub mod identity;
pub mod notify;

pub use identity::{Customer, CustomerDirectory, InMemoryCustomerDirectory};
pub use notify::{LogNotifier, Notifier};

/// Failure of a backing store (database, cache, broker).
///
/// Adapters translate their driver errors into one of these at the boundary so
/// the engine never depends on a concrete driver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
