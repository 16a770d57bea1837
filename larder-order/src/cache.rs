use async_trait::async_trait;
use larder_core::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Order, OrderFilter};

/// Which family of list queries an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Customer(Uuid),
    /// Staff-wide listings across all customers.
    All,
}

impl CacheScope {
    pub fn of(filter: &OrderFilter) -> Self {
        filter.customer_id.map_or(CacheScope::All, CacheScope::Customer)
    }
}

/// Cache of order list results, keyed by filter and scope generation.
///
/// Every write through the ledger calls [`OrderListCache::invalidate`], which
/// bumps the generation of the customer's scope and of [`CacheScope::All`].
/// Entries stored under an older generation are unreachable from then on, so a
/// reader that raced a write can never resurrect stale data.
#[async_trait]
pub trait OrderListCache: Send + Sync {
    async fn generation(&self, scope: CacheScope) -> StoreResult<u64>;
    async fn get(&self, filter: &OrderFilter, generation: u64) -> StoreResult<Option<Vec<Order>>>;
    async fn put(&self, filter: &OrderFilter, generation: u64, orders: &[Order]) -> StoreResult<()>;
    async fn invalidate(&self, customer_id: Uuid) -> StoreResult<()>;
}

#[derive(Default)]
struct CacheState {
    generations: HashMap<CacheScope, u64>,
    entries: HashMap<(OrderFilter, u64), Vec<Order>>,
}

#[derive(Default)]
pub struct InMemoryOrderListCache {
    state: Mutex<CacheState>,
}

impl InMemoryOrderListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Cache("order list cache lock poisoned".into()))
    }
}

#[async_trait]
impl OrderListCache for InMemoryOrderListCache {
    async fn generation(&self, scope: CacheScope) -> StoreResult<u64> {
        Ok(self.lock()?.generations.get(&scope).copied().unwrap_or(0))
    }

    async fn get(&self, filter: &OrderFilter, generation: u64) -> StoreResult<Option<Vec<Order>>> {
        Ok(self.lock()?.entries.get(&(filter.clone(), generation)).cloned())
    }

    async fn put(&self, filter: &OrderFilter, generation: u64, orders: &[Order]) -> StoreResult<()> {
        let mut state = self.lock()?;
        let current = state.generations.get(&CacheScope::of(filter)).copied().unwrap_or(0);
        if current == generation {
            state.entries.insert((filter.clone(), generation), orders.to_vec());
        }
        Ok(())
    }

    async fn invalidate(&self, customer_id: Uuid) -> StoreResult<()> {
        let mut state = self.lock()?;
        for scope in [CacheScope::Customer(customer_id), CacheScope::All] {
            *state.generations.entry(scope).or_insert(0) += 1;
        }

        // drop what just became unreachable
        let CacheState { generations, entries } = &mut *state;
        entries.retain(|(filter, generation), _| {
            generations.get(&CacheScope::of(filter)).copied().unwrap_or(0) == *generation
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(customer_id: Option<Uuid>) -> OrderFilter {
        OrderFilter { customer_id, status: None, limit: 20, offset: 0 }
    }

    #[tokio::test]
    async fn test_invalidate_bumps_customer_and_staff_scopes() {
        let cache = InMemoryOrderListCache::new();
        let customer = Uuid::new_v4();
        let other = Uuid::new_v4();

        cache.put(&filter(Some(customer)), 0, &[]).await.unwrap();
        cache.put(&filter(Some(other)), 0, &[]).await.unwrap();
        cache.put(&filter(None), 0, &[]).await.unwrap();
        assert_eq!(cache.len(), 3);

        cache.invalidate(customer).await.unwrap();

        assert_eq!(cache.generation(CacheScope::Customer(customer)).await.unwrap(), 1);
        assert_eq!(cache.generation(CacheScope::All).await.unwrap(), 1);
        assert_eq!(cache.generation(CacheScope::Customer(other)).await.unwrap(), 0);
        assert!(cache.get(&filter(Some(customer)), 0).await.unwrap().is_none());
        assert!(cache.get(&filter(None), 0).await.unwrap().is_none());
        assert!(cache.get(&filter(Some(other)), 0).await.unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_put_under_stale_generation_is_dropped() {
        let cache = InMemoryOrderListCache::new();
        let customer = Uuid::new_v4();

        let generation = cache.generation(CacheScope::Customer(customer)).await.unwrap();
        cache.invalidate(customer).await.unwrap();
        cache.put(&filter(Some(customer)), generation, &[]).await.unwrap();

        assert!(cache.is_empty());
    }
}
