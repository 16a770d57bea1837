use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_core::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::cache::{CacheScope, OrderListCache};
use crate::error::OrderError;
use crate::models::{FulfillmentPlan, Order, OrderFilter, OrderStatus, PaymentStatus, StatusChange};

/// Durable order storage. `insert` writes header, items and backorders as one
/// unit: either all of them are visible afterwards or none is.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Newest first.
    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Compare-and-set on status: applies `change` only while the stored
    /// status still equals `from`. Returns whether this call won.
    async fn transition(&self, id: Uuid, from: OrderStatus, change: &StatusChange) -> StoreResult<bool>;

    /// Undo a cancellation: moves the order back to `to` and clears the
    /// cancellation fields, only while it is still cancelled.
    async fn reopen(&self, id: Uuid, to: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Returns the previous payment status, `None` if the order is unknown.
    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentStatus>>;
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Database("order store lock poisoned".into())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Database(format!("duplicate order id {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().map_err(|_| Self::poisoned())?.get(&id).cloned())
    }

    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().map_err(|_| Self::poisoned())?;
        let mut matching: Vec<&Order> = orders
            .values()
            .filter(|o| filter.customer_id.map_or(true, |c| o.customer_id == c))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn transition(&self, id: Uuid, from: OrderStatus, change: &StatusChange) -> StoreResult<bool> {
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;
        match orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.apply_status(change);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reopen(&self, id: Uuid, to: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;
        match orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::Cancelled => {
                order.reopen(to, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentStatus>> {
        let mut orders = self.orders.write().map_err(|_| Self::poisoned())?;
        Ok(orders.get_mut(&id).map(|order| {
            let previous = order.payment_status;
            order.payment_status = status;
            order.updated_at = at;
            previous
        }))
    }
}

/// Order persistence plus the list cache in front of it.
///
/// All writes go through here so cache invalidation cannot be forgotten.
pub struct OrderLedger {
    orders: Arc<dyn OrderRepository>,
    cache: Arc<dyn OrderListCache>,
}

impl OrderLedger {
    pub fn new(orders: Arc<dyn OrderRepository>, cache: Arc<dyn OrderListCache>) -> Self {
        Self { orders, cache }
    }

    pub async fn create(
        &self,
        customer_id: Uuid,
        plan: &FulfillmentPlan,
        notes: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = Order::from_plan(customer_id, plan, notes, Utc::now())?;
        self.orders.insert(&order).await?;
        self.invalidate(customer_id).await;
        Ok(order)
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, OrderError> {
        self.orders.get(id).await?.ok_or(OrderError::OrderNotFound(id))
    }

    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let generation = match self.cache.generation(CacheScope::of(filter)).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("Order list cache unavailable, reading through: {}", e);
                return Ok(self.orders.list(filter).await?);
            }
        };

        match self.cache.get(filter, generation).await {
            Ok(Some(orders)) => return Ok(orders),
            Ok(None) => {}
            Err(e) => tracing::warn!("Order list cache read failed: {}", e),
        }

        let orders = self.orders.list(filter).await?;
        if let Err(e) = self.cache.put(filter, generation, &orders).await {
            tracing::warn!("Order list cache write failed: {}", e);
        }
        Ok(orders)
    }

    /// Compare-and-set the status of `order`. `false` means somebody else
    /// moved the order first and nothing was written.
    pub async fn transition(&self, order: &Order, change: &StatusChange) -> Result<bool, OrderError> {
        let won = self.orders.transition(order.id, order.status, change).await?;
        if won {
            self.invalidate(order.customer_id).await;
        }
        Ok(won)
    }

    /// Put a cancelled order back to `to`. `false` means it was no longer
    /// cancelled and nothing was written.
    pub async fn reopen(&self, order: &Order, to: OrderStatus) -> Result<bool, OrderError> {
        let reopened = self.orders.reopen(order.id, to, Utc::now()).await?;
        if reopened {
            self.invalidate(order.customer_id).await;
        }
        Ok(reopened)
    }

    /// Returns the updated order and the payment status it had before.
    pub async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<(Order, PaymentStatus), OrderError> {
        let mut order = self.get(id).await?;
        let at = Utc::now();
        let previous = self
            .orders
            .set_payment_status(id, status, at)
            .await?
            .ok_or(OrderError::OrderNotFound(id))?;
        self.invalidate(order.customer_id).await;

        order.payment_status = status;
        order.updated_at = at;
        Ok((order, previous))
    }

    async fn invalidate(&self, customer_id: Uuid) {
        if let Err(e) = self.cache.invalidate(customer_id).await {
            tracing::error!("Failed to invalidate order lists for customer {}: {}", customer_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryOrderListCache;
    use crate::models::FulfillmentLine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts list calls that reach storage.
    struct CountingRepository {
        inner: InMemoryOrderRepository,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl OrderRepository for CountingRepository {
        async fn insert(&self, order: &Order) -> StoreResult<()> {
            self.inner.insert(order).await
        }
        async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
            self.inner.get(id).await
        }
        async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list(filter).await
        }
        async fn transition(&self, id: Uuid, from: OrderStatus, change: &StatusChange) -> StoreResult<bool> {
            self.inner.transition(id, from, change).await
        }
        async fn reopen(&self, id: Uuid, to: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool> {
            self.inner.reopen(id, to, at).await
        }
        async fn set_payment_status(
            &self,
            id: Uuid,
            status: PaymentStatus,
            at: DateTime<Utc>,
        ) -> StoreResult<Option<PaymentStatus>> {
            self.inner.set_payment_status(id, status, at).await
        }
    }

    fn plan(quantity: i32) -> FulfillmentPlan {
        FulfillmentPlan {
            lines: vec![FulfillmentLine {
                product_id: Uuid::new_v4(),
                product_name: "Queso manchego curado".into(),
                quantity,
                unit_price_cents: 1500,
                discount_percentage: 0.0,
                total_price_cents: 1500 * i64::from(quantity),
            }],
            backorders: vec![],
        }
    }

    fn customer_filter(customer_id: Uuid) -> OrderFilter {
        OrderFilter { customer_id: Some(customer_id), status: None, limit: 20, offset: 0 }
    }

    fn ledger() -> (OrderLedger, Arc<CountingRepository>) {
        let repo = Arc::new(CountingRepository {
            inner: InMemoryOrderRepository::new(),
            lists: AtomicUsize::new(0),
        });
        let ledger = OrderLedger::new(repo.clone(), Arc::new(InMemoryOrderListCache::new()));
        (ledger, repo)
    }

    #[tokio::test]
    async fn test_list_is_cached_until_next_write() {
        let (ledger, repo) = ledger();
        let customer = Uuid::new_v4();

        ledger.create(customer, &plan(1), None).await.unwrap();
        assert_eq!(ledger.list(&customer_filter(customer)).await.unwrap().len(), 1);
        assert_eq!(ledger.list(&customer_filter(customer)).await.unwrap().len(), 1);
        assert_eq!(repo.lists.load(Ordering::SeqCst), 1);

        ledger.create(customer, &plan(2), None).await.unwrap();
        assert_eq!(ledger.list(&customer_filter(customer)).await.unwrap().len(), 2);
        assert_eq!(repo.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_status_change_is_visible_in_filtered_lists() {
        let (ledger, _repo) = ledger();
        let customer = Uuid::new_v4();
        let order = ledger.create(customer, &plan(1), None).await.unwrap();

        let pending = OrderFilter { status: Some(OrderStatus::Pending), ..customer_filter(customer) };
        assert_eq!(ledger.list(&pending).await.unwrap().len(), 1);

        let change = StatusChange { to: OrderStatus::Confirmed, at: Utc::now(), reason: None };
        assert!(ledger.transition(&order, &change).await.unwrap());

        assert!(ledger.list(&pending).await.unwrap().is_empty());
        let staff_view = OrderFilter { customer_id: None, ..pending };
        assert!(ledger.list(&staff_view).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let (ledger, _repo) = ledger();
        let order = ledger.create(Uuid::new_v4(), &plan(1), None).await.unwrap();
        let change = StatusChange { to: OrderStatus::Cancelled, at: Utc::now(), reason: None };

        assert!(ledger.transition(&order, &change).await.unwrap());
        // same stale snapshot a second time loses
        assert!(!ledger.transition(&order, &change).await.unwrap());
        assert_eq!(ledger.get(order.id).await.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_reopen_only_touches_cancelled_orders() {
        let (ledger, _repo) = ledger();
        let customer = Uuid::new_v4();
        let order = ledger.create(customer, &plan(1), None).await.unwrap();
        assert!(!ledger.reopen(&order, OrderStatus::Pending).await.unwrap());

        let cancel = StatusChange { to: OrderStatus::Cancelled, at: Utc::now(), reason: Some("duplicado".into()) };
        assert!(ledger.transition(&order, &cancel).await.unwrap());
        let cancelled = OrderFilter { status: Some(OrderStatus::Cancelled), ..customer_filter(customer) };
        assert_eq!(ledger.list(&cancelled).await.unwrap().len(), 1);

        assert!(ledger.reopen(&order, OrderStatus::Pending).await.unwrap());
        let reopened = ledger.get(order.id).await.unwrap();
        assert_eq!(reopened.status, OrderStatus::Pending);
        assert!(reopened.cancelled_at.is_none());
        assert!(reopened.cancellation_reason.is_none());
        assert!(ledger.list(&cancelled).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_order_and_pagination() {
        let (ledger, _repo) = ledger();
        let customer = Uuid::new_v4();
        let mut created = Vec::new();
        for quantity in 1..=5 {
            created.push(ledger.create(customer, &plan(quantity), None).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = OrderFilter { limit: 2, offset: 1, ..customer_filter(customer) };
        let orders = ledger.list(&page).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, created[3].id);
        assert_eq!(orders[1].id, created[2].id);

        let other = ledger.list(&customer_filter(Uuid::new_v4())).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_payment_status() {
        let (ledger, _repo) = ledger();
        let order = ledger.create(Uuid::new_v4(), &plan(1), None).await.unwrap();

        let (updated, previous) = ledger.set_payment_status(order.id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(previous, PaymentStatus::Pending);
        assert_eq!(updated.payment_status, PaymentStatus::Paid);
        assert_eq!(updated.status, OrderStatus::Pending);

        let missing = ledger.set_payment_status(Uuid::new_v4(), PaymentStatus::Paid).await;
        assert!(matches!(missing, Err(OrderError::OrderNotFound(_))));
    }
}
