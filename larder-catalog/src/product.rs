use larder_core::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable catalog product together with its stock counter.
///
/// `on_hand` is a snapshot taken when the product was loaded. The stock store
/// owns the live value; never derive a write from this field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub unit: String,
    /// Base unit price in minor units (cents).
    pub base_price_cents: i64,
    pub on_hand: i32,
    pub min_stock: i32,
    pub is_active: bool,
}

impl Product {
    pub fn new(name: impl Into<String>, category: impl Into<String>, base_price_cents: i64, on_hand: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            unit: "ud".to_string(),
            base_price_cents,
            on_hand,
            min_stock: 0,
            is_active: true,
        }
    }

    pub fn with_min_stock(mut self, min_stock: i32) -> Self {
        self.min_stock = min_stock;
        self
    }

    pub fn is_low_stock(&self) -> bool {
        self.is_active && self.on_hand <= self.min_stock
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid catalog input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
