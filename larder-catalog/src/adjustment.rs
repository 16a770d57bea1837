use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::inventory::StockStore;
use crate::product::CatalogError;

/// Why stock is being corrected outside of order placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Spoilage, breakage, loss. Always removes stock.
    Shrinkage,
    /// Goods sent back by a customer. Always adds stock.
    Return,
    /// Signed fix of a booking mistake.
    Correction,
    /// Signed difference found during a physical count.
    Count,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Shrinkage => "shrinkage",
            AdjustmentKind::Return => "return",
            AdjustmentKind::Correction => "correction",
            AdjustmentKind::Count => "count",
        }
    }

    /// Signed change in on-hand stock for a requested `quantity`.
    pub fn delta(&self, quantity: i32) -> i32 {
        match self {
            AdjustmentKind::Shrinkage => -quantity.saturating_abs(),
            AdjustmentKind::Return => quantity.saturating_abs(),
            AdjustmentKind::Correction | AdjustmentKind::Count => quantity,
        }
    }
}

impl std::str::FromStr for AdjustmentKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shrinkage" => Ok(AdjustmentKind::Shrinkage),
            "return" => Ok(AdjustmentKind::Return),
            "correction" => Ok(AdjustmentKind::Correction),
            "count" => Ok(AdjustmentKind::Count),
            other => Err(CatalogError::Validation(format!("unknown adjustment kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentRequest {
    pub product_id: Uuid,
    pub kind: AdjustmentKind,
    pub quantity: i32,
    pub reason: String,
    pub notes: Option<String>,
}

/// Audit record of an applied adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockAdjustment {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: AdjustmentKind,
    pub delta: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Largest stock change one adjustment may make, in either direction.
pub const MAX_ADJUSTMENT_QUANTITY: i32 = 1_000_000;

/// Applies staff stock corrections through the same conditional primitives
/// used by reservations.
pub struct StockAdjuster {
    stock: Arc<dyn StockStore>,
}

impl StockAdjuster {
    pub fn new(stock: Arc<dyn StockStore>) -> Self {
        Self { stock }
    }

    pub async fn apply(&self, request: AdjustmentRequest) -> Result<StockAdjustment, CatalogError> {
        if request.reason.trim().is_empty() {
            return Err(CatalogError::Validation("reason is required".into()));
        }
        if request.quantity.checked_abs().map_or(true, |q| q > MAX_ADJUSTMENT_QUANTITY) {
            return Err(CatalogError::Validation(format!(
                "adjustment quantity must be within {}",
                MAX_ADJUSTMENT_QUANTITY
            )));
        }
        let delta = request.kind.delta(request.quantity);
        if delta == 0 {
            return Err(CatalogError::Validation("adjustment quantity must not be zero".into()));
        }

        let new_quantity = if delta < 0 {
            match self.stock.try_decrement(request.product_id, -delta).await? {
                Some(quantity) => quantity,
                None => {
                    let available = self
                        .stock
                        .on_hand(request.product_id)
                        .await?
                        .ok_or(CatalogError::NotFound(request.product_id))?;
                    return Err(CatalogError::InsufficientStock {
                        product_id: request.product_id,
                        requested: -delta,
                        available,
                    });
                }
            }
        } else {
            self.stock
                .increment(request.product_id, delta)
                .await?
                .ok_or(CatalogError::NotFound(request.product_id))?
        };

        let adjustment = StockAdjustment {
            id: Uuid::new_v4(),
            product_id: request.product_id,
            kind: request.kind,
            delta,
            previous_quantity: new_quantity - delta,
            new_quantity,
            reason: request.reason,
            notes: request.notes,
            created_at: Utc::now(),
        };

        if let Err(e) = self.stock.record_adjustment(&adjustment).await {
            // stock already moved; the audit row is the only thing lost
            tracing::error!("Failed to record stock adjustment {}: {}", adjustment.id, e);
        }

        tracing::info!(
            "Stock adjusted for {}: {} {} -> {}",
            adjustment.product_id,
            adjustment.kind.as_str(),
            adjustment.previous_quantity,
            adjustment.new_quantity
        );
        Ok(adjustment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InMemoryStockStore;
    use crate::product::Product;

    fn setup(on_hand: i32) -> (Arc<InMemoryStockStore>, StockAdjuster, Uuid) {
        let store = Arc::new(InMemoryStockStore::new());
        let product = Product::new("Tomate triturado 3kg", "conservas", 450, on_hand);
        let id = product.id;
        store.insert(product);
        let adjuster = StockAdjuster::new(store.clone());
        (store, adjuster, id)
    }

    fn request(product_id: Uuid, kind: AdjustmentKind, quantity: i32) -> AdjustmentRequest {
        AdjustmentRequest {
            product_id,
            kind,
            quantity,
            reason: "recuento semanal".into(),
            notes: None,
        }
    }

    #[test]
    fn test_request_kind_from_json() {
        let body = serde_json::json!({
            "product_id": Uuid::new_v4(),
            "kind": "count",
            "quantity": -4,
            "reason": "inventario mensual",
            "notes": null
        });
        let req: AdjustmentRequest = serde_json::from_value(body).unwrap();

        assert_eq!(req.kind, AdjustmentKind::Count);
        assert_eq!(req.kind.delta(req.quantity), -4);
        assert!("merma".parse::<AdjustmentKind>().is_err());
    }

    #[tokio::test]
    async fn test_shrinkage_and_return() {
        let (store, adjuster, id) = setup(10);

        let shrink = adjuster.apply(request(id, AdjustmentKind::Shrinkage, 3)).await.unwrap();
        assert_eq!((shrink.previous_quantity, shrink.new_quantity, shrink.delta), (10, 7, -3));

        let ret = adjuster.apply(request(id, AdjustmentKind::Return, -2)).await.unwrap();
        assert_eq!(ret.delta, 2);
        assert_eq!(store.on_hand(id).await.unwrap(), Some(9));
        assert_eq!(store.adjustments().len(), 2);
    }

    #[tokio::test]
    async fn test_adjustment_cannot_make_stock_negative() {
        let (store, adjuster, id) = setup(2);

        let err = adjuster.apply(request(id, AdjustmentKind::Count, -5)).await.unwrap_err();
        assert!(matches!(err, CatalogError::InsufficientStock { requested: 5, available: 2, .. }));
        assert_eq!(store.on_hand(id).await.unwrap(), Some(2));
        assert!(store.adjustments().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_adjustments() {
        let (_store, adjuster, id) = setup(2);

        assert!(matches!(
            adjuster.apply(request(id, AdjustmentKind::Correction, 0)).await,
            Err(CatalogError::Validation(_))
        ));

        for quantity in [i32::MIN, -(MAX_ADJUSTMENT_QUANTITY + 1), MAX_ADJUSTMENT_QUANTITY + 1] {
            assert!(matches!(
                adjuster.apply(request(id, AdjustmentKind::Shrinkage, quantity)).await,
                Err(CatalogError::Validation(_))
            ));
        }
        assert_eq!(AdjustmentKind::Return.delta(i32::MIN), i32::MAX);

        let mut blank = request(id, AdjustmentKind::Return, 1);
        blank.reason = " ".into();
        assert!(matches!(adjuster.apply(blank).await, Err(CatalogError::Validation(_))));

        assert!(matches!(
            adjuster.apply(request(Uuid::new_v4(), AdjustmentKind::Return, 1)).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            adjuster.apply(request(Uuid::new_v4(), AdjustmentKind::Shrinkage, 1)).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("count".parse::<AdjustmentKind>().unwrap(), AdjustmentKind::Count);
        assert!("merma".parse::<AdjustmentKind>().is_err());
    }
}
