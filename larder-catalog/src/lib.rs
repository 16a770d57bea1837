pub mod product;
pub mod pricing;
pub mod inventory;
pub mod adjustment;

pub use product::{CatalogError, Product};
pub use pricing::{
    CustomerPricing, DiscountRepository, DiscountRule, InMemoryDiscountRepository, PrecedenceTier,
    PriceQuote, PriceResolver,
};
pub use inventory::{AvailabilityChecker, InMemoryStockStore, StockStore};
pub use adjustment::{AdjustmentKind, AdjustmentRequest, StockAdjuster, StockAdjustment};
