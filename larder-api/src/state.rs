use std::sync::Arc;
use larder_catalog::{DiscountRepository, StockAdjuster, StockStore};
use larder_core::{CustomerDirectory, Notifier};
use larder_order::{OrderConfig, OrderService, OrderStores};

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub adjuster: Arc<StockAdjuster>,
    pub stock: Arc<dyn StockStore>,
    pub discounts: Arc<dyn DiscountRepository>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub metrics: Arc<ApiMetrics>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        stores: OrderStores,
        notifier: Arc<dyn Notifier>,
        config: OrderConfig,
        auth: AuthConfig,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            adjuster: Arc::new(StockAdjuster::new(stores.stock.clone())),
            stock: stores.stock.clone(),
            discounts: stores.discounts.clone(),
            customers: stores.customers.clone(),
            orders: Arc::new(OrderService::new(stores, notifier, config)),
            metrics: Arc::new(ApiMetrics::new()?),
            auth,
        })
    }
}
