use chrono::Utc;
use larder_catalog::StockStore;
use larder_core::StoreError;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OrderError;
use crate::ledger::OrderLedger;
use crate::models::{Order, OrderStatus, StatusChange};

/// Legal moves. Everything not listed here is rejected.
///
/// ```text
/// pending ──► confirmed ──► prepared ──► delivered
///    │            │
///    └────────────┴──► cancelled
/// ```
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Confirmed),
    (OrderStatus::Confirmed, OrderStatus::Prepared),
    (OrderStatus::Prepared, OrderStatus::Delivered),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Confirmed, OrderStatus::Cancelled),
];

impl OrderStatus {
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        TRANSITIONS.contains(&(self, to))
    }
}

/// Stock put back by a cancellation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RestockedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_restored: i32,
}

/// Outcome of an accepted transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub from: OrderStatus,
    pub restocked: Vec<RestockedLine>,
}

/// Drives status changes and the cancellation compensator.
pub struct OrderStateMachine {
    ledger: Arc<OrderLedger>,
    stock: Arc<dyn StockStore>,
}

impl OrderStateMachine {
    pub fn new(ledger: Arc<OrderLedger>, stock: Arc<dyn StockStore>) -> Self {
        Self { ledger, stock }
    }

    pub async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        reason: Option<String>,
    ) -> Result<Transition, OrderError> {
        let order = self.ledger.get(order_id).await?;
        self.transition_order(order, to, reason).await
    }

    /// Apply `to` on an already loaded order. The ledger write is a
    /// compare-and-set on `order.status`, so of two racing callers only one
    /// wins, and only the winner runs the compensator.
    ///
    /// A cancellation whose restock fails is rolled back: the order is
    /// reopened in its previous status and the call returns
    /// [`OrderError::Persistence`], so it can be retried.
    pub async fn transition_order(
        &self,
        mut order: Order,
        to: OrderStatus,
        reason: Option<String>,
    ) -> Result<Transition, OrderError> {
        let from = order.status;
        if !from.can_transition_to(to) {
            return Err(OrderError::IllegalTransition { from, to });
        }

        let change = StatusChange {
            to,
            at: Utc::now(),
            reason: if to == OrderStatus::Cancelled { reason } else { None },
        };

        if !self.ledger.transition(&order, &change).await? {
            let current = self.ledger.get(order.id).await?;
            tracing::warn!(
                "Order {} moved to {} concurrently; {} -> {} rejected",
                order.id,
                current.status,
                from,
                to
            );
            return Err(OrderError::IllegalTransition { from: current.status, to });
        }

        let restocked = if to == OrderStatus::Cancelled {
            match self.restock(&order).await {
                Ok(restocked) => restocked,
                Err(e) => {
                    self.reopen(&order, from).await;
                    return Err(e);
                }
            }
        } else {
            Vec::new()
        };
        order.apply_status(&change);

        tracing::info!("Order {} moved {} -> {}", order.id, from, to);
        Ok(Transition { order, from, restocked })
    }

    /// Returns every line to stock, or none: on the first failure the lines
    /// already restored are taken out again.
    async fn restock(&self, order: &Order) -> Result<Vec<RestockedLine>, OrderError> {
        let mut restocked = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let failure = match self.stock.increment(item.product_id, item.quantity).await {
                Ok(Some(on_hand)) => {
                    tracing::debug!("Restocked {} of {} (now {})", item.quantity, item.product_id, on_hand);
                    restocked.push(RestockedLine {
                        product_id: item.product_id,
                        product_name: item.product_name.clone(),
                        quantity_restored: item.quantity,
                    });
                    continue;
                }
                Ok(None) => StoreError::Corrupt(format!("product {} is missing", item.product_id)),
                Err(e) => e,
            };

            tracing::error!(
                "Failed to restock {} of {} for cancelled order {}: {}",
                item.quantity,
                item.product_id,
                order.id,
                failure
            );
            self.take_back(order, &restocked).await;
            return Err(OrderError::Persistence(failure));
        }
        Ok(restocked)
    }

    async fn take_back(&self, order: &Order, restocked: &[RestockedLine]) {
        for line in restocked.iter().rev() {
            match self.stock.try_decrement(line.product_id, line.quantity_restored).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::error!(
                    "Restocked {} of {} for order {} was sold before it could be taken back",
                    line.quantity_restored,
                    line.product_id,
                    order.id
                ),
                Err(e) => tracing::error!(
                    "Failed to take back {} of {} for order {}: {}",
                    line.quantity_restored,
                    line.product_id,
                    order.id,
                    e
                ),
            }
        }
    }

    async fn reopen(&self, order: &Order, to: OrderStatus) {
        match self.ledger.reopen(order, to).await {
            Ok(true) => tracing::warn!("Cancellation of order {} rolled back to {}", order.id, to),
            Ok(false) => tracing::error!("Order {} left cancelled state before its rollback", order.id),
            Err(e) => tracing::error!("Order {} stays cancelled without its stock returned: {}", order.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryOrderListCache;
    use crate::ledger::InMemoryOrderRepository;
    use crate::models::{FulfillmentLine, FulfillmentPlan};
    use async_trait::async_trait;
    use larder_catalog::{InMemoryStockStore, Product, StockAdjustment};
    use larder_core::StoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the n-th `increment` call (1-based) once; everything else
    /// passes through.
    struct FlakyStock {
        inner: Arc<InMemoryStockStore>,
        increments: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl StockStore for FlakyStock {
        async fn get_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
            self.inner.get_products(ids).await
        }
        async fn on_hand(&self, product_id: Uuid) -> StoreResult<Option<i32>> {
            self.inner.on_hand(product_id).await
        }
        async fn try_decrement(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
            self.inner.try_decrement(product_id, quantity).await
        }
        async fn increment(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
            if self.increments.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Database("connection reset".into()));
            }
            self.inner.increment(product_id, quantity).await
        }
        async fn low_stock(&self) -> StoreResult<Vec<Product>> {
            self.inner.low_stock().await
        }
        async fn record_adjustment(&self, adjustment: &StockAdjustment) -> StoreResult<()> {
            self.inner.record_adjustment(adjustment).await
        }
    }

    struct Fixture {
        machine: OrderStateMachine,
        ledger: Arc<OrderLedger>,
        stock: Arc<InMemoryStockStore>,
        product_id: Uuid,
    }

    fn fixture() -> Fixture {
        let stock = Arc::new(InMemoryStockStore::new());
        let product = Product::new("Jamón serrano loncheado", "embutidos", 899, 4);
        let product_id = product.id;
        stock.insert(product);
        let ledger = Arc::new(OrderLedger::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryOrderListCache::new()),
        ));
        let machine = OrderStateMachine::new(ledger.clone(), stock.clone());
        Fixture { machine, ledger, stock, product_id }
    }

    async fn place(f: &Fixture, quantity: i32) -> Order {
        // stock was taken at placement; mirror that here
        f.stock.try_decrement(f.product_id, quantity).await.unwrap().unwrap();
        let plan = FulfillmentPlan {
            lines: vec![FulfillmentLine {
                product_id: f.product_id,
                product_name: "Jamón serrano loncheado".into(),
                quantity,
                unit_price_cents: 899,
                discount_percentage: 0.0,
                total_price_cents: 899 * i64::from(quantity),
            }],
            backorders: vec![],
        };
        f.ledger.create(Uuid::new_v4(), &plan, None).await.unwrap()
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Prepared));
        assert!(Prepared.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Prepared));
        assert!(!Prepared.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[tokio::test]
    async fn test_forward_lifecycle_sets_timestamps_and_keeps_stock() {
        let f = fixture();
        let order = place(&f, 3).await;

        let confirmed = f.machine.transition(order.id, OrderStatus::Confirmed, None).await.unwrap();
        assert!(confirmed.order.confirmed_at.is_some());
        let prepared = f.machine.transition(order.id, OrderStatus::Prepared, None).await.unwrap();
        assert!(prepared.order.prepared_at.is_some());
        let delivered = f.machine.transition(order.id, OrderStatus::Delivered, None).await.unwrap();
        assert!(delivered.order.delivered_at.is_some());
        assert!(delivered.restocked.is_empty());

        assert_eq!(f.stock.on_hand(f.product_id).await.unwrap(), Some(1));
        assert_eq!(f.ledger.get(order.id).await.unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_illegal_transition_changes_nothing() {
        let f = fixture();
        let order = place(&f, 1).await;

        let err = f.machine.transition(order.id, OrderStatus::Delivered, None).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::IllegalTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered }
        ));
        assert_eq!(f.ledger.get(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_restocks_exactly_once() {
        let f = fixture();
        let order = place(&f, 3).await;
        assert_eq!(f.stock.on_hand(f.product_id).await.unwrap(), Some(1));

        let cancelled = f
            .machine
            .transition(order.id, OrderStatus::Cancelled, Some("cliente cerrado".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.order.cancellation_reason.as_deref(), Some("cliente cerrado"));
        assert_eq!(cancelled.restocked[0].quantity_restored, 3);
        assert_eq!(f.stock.on_hand(f.product_id).await.unwrap(), Some(4));

        let again = f.machine.transition(order.id, OrderStatus::Cancelled, None).await;
        assert!(matches!(again, Err(OrderError::IllegalTransition { from: OrderStatus::Cancelled, .. })));
        assert_eq!(f.stock.on_hand(f.product_id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_racing_cancels_restock_once() {
        let f = Arc::new(fixture());
        let order = place(&f, 4).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = f.clone();
            let snapshot = order.clone();
            handles.push(tokio::spawn(async move {
                f.machine.transition_order(snapshot, OrderStatus::Cancelled, None).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(f.stock.on_hand(f.product_id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_failed_restock_rolls_back_cancellation() {
        let stock = Arc::new(InMemoryStockStore::new());
        let ham = Product::new("Jamón serrano loncheado", "embutidos", 899, 10);
        let oil = Product::new("Aceite de oliva virgen extra 5L", "aceites", 3450, 10);
        let (ham_id, oil_id) = (ham.id, oil.id);
        stock.insert(ham);
        stock.insert(oil);
        stock.try_decrement(ham_id, 4).await.unwrap().unwrap();
        stock.try_decrement(oil_id, 2).await.unwrap().unwrap();

        let ledger = Arc::new(OrderLedger::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryOrderListCache::new()),
        ));
        let line = |product_id, product_name: &str, quantity: i32, price: i64| FulfillmentLine {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price_cents: price,
            discount_percentage: 0.0,
            total_price_cents: price * i64::from(quantity),
        };
        let plan = FulfillmentPlan {
            lines: vec![line(ham_id, "Jamón serrano loncheado", 4, 899), line(oil_id, "Aceite", 2, 3450)],
            backorders: vec![],
        };
        let order = ledger.create(Uuid::new_v4(), &plan, None).await.unwrap();

        // the second line's increment fails after the first already went back
        let flaky = Arc::new(FlakyStock { inner: stock.clone(), increments: AtomicUsize::new(0), fail_on: 2 });
        let machine = OrderStateMachine::new(ledger.clone(), flaky);

        let err = machine
            .transition(order.id, OrderStatus::Cancelled, Some("cierre temporal".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Persistence(_)));

        let current = ledger.get(order.id).await.unwrap();
        assert_eq!(current.status, OrderStatus::Pending);
        assert!(current.cancelled_at.is_none());
        assert!(current.cancellation_reason.is_none());
        assert_eq!(stock.on_hand(ham_id).await.unwrap(), Some(6));
        assert_eq!(stock.on_hand(oil_id).await.unwrap(), Some(8));

        let retried = machine.transition(order.id, OrderStatus::Cancelled, None).await.unwrap();
        assert_eq!(retried.from, OrderStatus::Pending);
        assert_eq!(retried.restocked.len(), 2);
        assert_eq!(stock.on_hand(ham_id).await.unwrap(), Some(10));
        assert_eq!(stock.on_hand(oil_id).await.unwrap(), Some(10));
        assert_eq!(ledger.get(order.id).await.unwrap().status, OrderStatus::Cancelled);
    }
}
