use larder_catalog::StockStore;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::FulfillmentLine;

/// Takes stock for a whole order, all or nothing.
#[derive(Clone)]
pub struct ReservationExecutor {
    stock: Arc<dyn StockStore>,
}

impl ReservationExecutor {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    /// Conditionally decrement every line. If any line is refused, the lines
    /// already taken are put back before the conflict is returned.
    pub async fn reserve(&self, lines: &[FulfillmentLine]) -> Result<Reservation, OrderError> {
        let mut reservation = Reservation::new(self.stock.clone());

        for line in lines {
            match self.stock.try_decrement(line.product_id, line.quantity).await {
                Ok(Some(remaining)) => {
                    tracing::debug!("Reserved {} of {} ({} left)", line.quantity, line.product_id, remaining);
                    reservation.taken.push((line.product_id, line.quantity));
                }
                Ok(None) => {
                    tracing::warn!(
                        "Reservation conflict on {}: {} units no longer available",
                        line.product_id,
                        line.quantity
                    );
                    reservation.release().await;
                    return Err(OrderError::ReservationConflict {
                        product_id: line.product_id,
                        requested: line.quantity,
                    });
                }
                Err(e) => {
                    reservation.release().await;
                    return Err(OrderError::Persistence(e));
                }
            }
        }

        Ok(reservation)
    }
}

/// Stock taken for one order that has not yet been handed to the ledger.
///
/// Must end in exactly one of [`Reservation::commit`] (the order was
/// persisted) or [`Reservation::release`] (put everything back).
pub struct Reservation {
    stock: Arc<dyn StockStore>,
    taken: Vec<(Uuid, i32)>,
    settled: bool,
}

impl Reservation {
    fn new(stock: Arc<dyn StockStore>) -> Self {
        Self {
            stock,
            taken: Vec::new(),
            settled: false,
        }
    }

    pub fn taken(&self) -> &[(Uuid, i32)] {
        &self.taken
    }

    /// The order owning this stock is durable; nothing to undo anymore.
    pub fn commit(mut self) {
        self.settled = true;
    }

    /// Restore every reservation taken so far, in reverse order.
    pub async fn release(mut self) {
        self.settled = true;
        for (product_id, quantity) in self.taken.iter().rev() {
            match self.stock.increment(*product_id, *quantity).await {
                Ok(Some(_)) => {
                    tracing::debug!("Released {} of {}", quantity, product_id);
                }
                Ok(None) => {
                    tracing::error!("Cannot release {} of {}: product no longer exists", quantity, product_id);
                }
                Err(e) => {
                    tracing::error!("Failed to release {} of {}: {}", quantity, product_id, e);
                }
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled && !self.taken.is_empty() {
            tracing::error!("Reservation dropped unsettled, {} lines still held", self.taken.len());
        }
    }
}
