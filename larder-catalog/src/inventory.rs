use async_trait::async_trait;
use larder_core::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::adjustment::StockAdjustment;
use crate::product::Product;

/// Authoritative product/stock store.
///
/// Stock may only change through [`StockStore::try_decrement`] and
/// [`StockStore::increment`]. Both are atomic per product and return the
/// resulting on-hand quantity, or `None` when the change was refused.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Active products among `ids`. Unknown or inactive ids are simply absent.
    async fn get_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;

    /// Current on-hand quantity, read from the source of truth.
    async fn on_hand(&self, product_id: Uuid) -> StoreResult<Option<i32>>;

    /// Decrement by `quantity` only if on-hand >= `quantity`.
    async fn try_decrement(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>>;

    /// Increment by `quantity`. `None` if the product does not exist.
    async fn increment(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>>;

    /// Active products at or below their minimum-stock threshold.
    async fn low_stock(&self) -> StoreResult<Vec<Product>>;

    async fn record_adjustment(&self, adjustment: &StockAdjustment) -> StoreResult<()>;
}

/// Reads current availability for planning. Advisory only: the conditional
/// decrement re-checks at reservation time.
#[derive(Clone)]
pub struct AvailabilityChecker {
    stock: Arc<dyn StockStore>,
}

impl AvailabilityChecker {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    pub async fn available(&self, product_id: Uuid) -> StoreResult<i32> {
        Ok(self.stock.on_hand(product_id).await?.unwrap_or(0).max(0))
    }
}

struct StockSlot {
    product: Product,
    on_hand: AtomicI32,
}

/// In-process stock store. Each product's counter is an atomic updated with a
/// compare-and-swap loop, so concurrent reservations serialize per product
/// without a global lock.
#[derive(Default)]
pub struct InMemoryStockStore {
    slots: RwLock<HashMap<Uuid, StockSlot>>,
    adjustments: Mutex<Vec<StockAdjustment>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or replace) a product.
    pub fn insert(&self, product: Product) {
        if let Ok(mut slots) = self.slots.write() {
            let on_hand = AtomicI32::new(product.on_hand.max(0));
            slots.insert(product.id, StockSlot { product, on_hand });
        }
    }

    pub fn adjustments(&self) -> Vec<StockAdjustment> {
        self.adjustments.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn read_slots(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<Uuid, StockSlot>>> {
        self.slots
            .read()
            .map_err(|_| StoreError::Database("stock store lock poisoned".into()))
    }

    fn snapshot(slot: &StockSlot) -> Product {
        let mut product = slot.product.clone();
        product.on_hand = slot.on_hand.load(Ordering::Acquire);
        product
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn get_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let slots = self.read_slots()?;
        Ok(ids
            .iter()
            .filter_map(|id| slots.get(id))
            .filter(|slot| slot.product.is_active)
            .map(Self::snapshot)
            .collect())
    }

    async fn on_hand(&self, product_id: Uuid) -> StoreResult<Option<i32>> {
        let slots = self.read_slots()?;
        Ok(slots.get(&product_id).map(|slot| slot.on_hand.load(Ordering::Acquire)))
    }

    async fn try_decrement(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
        if quantity <= 0 {
            return Ok(None);
        }
        let slots = self.read_slots()?;
        let Some(slot) = slots.get(&product_id) else {
            return Ok(None);
        };

        let previous = slot.on_hand.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current >= quantity).then(|| current - quantity)
        });
        Ok(previous.ok().map(|before| before - quantity))
    }

    async fn increment(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
        if quantity <= 0 {
            return Ok(None);
        }
        let slots = self.read_slots()?;
        let Some(slot) = slots.get(&product_id) else {
            return Ok(None);
        };

        let previous = slot
            .on_hand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_add(quantity))
            .map_err(|_| StoreError::Database(format!("stock overflow for product {}", product_id)))?;
        Ok(Some(previous + quantity))
    }

    async fn low_stock(&self) -> StoreResult<Vec<Product>> {
        let slots = self.read_slots()?;
        let mut low: Vec<Product> = slots
            .values()
            .map(Self::snapshot)
            .filter(Product::is_low_stock)
            .collect();
        low.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(low)
    }

    async fn record_adjustment(&self, adjustment: &StockAdjustment) -> StoreResult<()> {
        self.adjustments
            .lock()
            .map_err(|_| StoreError::Database("adjustment log lock poisoned".into()))?
            .push(adjustment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(on_hand: i32) -> (Arc<InMemoryStockStore>, Uuid) {
        let store = Arc::new(InMemoryStockStore::new());
        let product = Product::new("Aceite de oliva 5L", "aceites", 2450, on_hand);
        let id = product.id;
        store.insert(product);
        (store, id)
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let (store, id) = store_with(10);

        assert_eq!(store.try_decrement(id, 4).await.unwrap(), Some(6));
        assert_eq!(store.try_decrement(id, 7).await.unwrap(), None);
        assert_eq!(store.on_hand(id).await.unwrap(), Some(6));
        assert_eq!(store.try_decrement(id, 6).await.unwrap(), Some(0));
        assert_eq!(store.try_decrement(id, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_and_unknown_product() {
        let (store, id) = store_with(0);

        assert_eq!(store.increment(id, 3).await.unwrap(), Some(3));
        assert_eq!(store.increment(Uuid::new_v4(), 3).await.unwrap(), None);
        assert_eq!(store.try_decrement(Uuid::new_v4(), 1).await.unwrap(), None);
        assert_eq!(store.try_decrement(id, 0).await.unwrap(), None);
        assert_eq!(store.increment(id, -2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inactive_products_are_hidden() {
        let store = InMemoryStockStore::new();
        let mut product = Product::new("Harina 25kg", "harinas", 1800, 5);
        product.is_active = false;
        let id = product.id;
        store.insert(product);

        assert!(store.get_products(&[id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_oversell() {
        let (store, id) = store_with(100);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.try_decrement(id, 3).await.unwrap() }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                reserved += 3;
            }
        }

        assert_eq!(reserved, 99);
        assert_eq!(store.on_hand(id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_low_stock_report() {
        let store = InMemoryStockStore::new();
        let low = Product::new("Sal gorda", "especias", 90, 2).with_min_stock(5);
        let fine = Product::new("Azúcar", "dulces", 120, 50).with_min_stock(5);
        store.insert(low.clone());
        store.insert(fine);

        let report = store.low_stock().await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].id, low.id);
    }

    #[tokio::test]
    async fn test_availability_checker_reads_live_value() {
        let (store, id) = store_with(8);
        let checker = AvailabilityChecker::new(store.clone());

        assert_eq!(checker.available(id).await.unwrap(), 8);
        store.try_decrement(id, 5).await.unwrap();
        assert_eq!(checker.available(id).await.unwrap(), 3);
        assert_eq!(checker.available(Uuid::new_v4()).await.unwrap(), 0);
    }
}
