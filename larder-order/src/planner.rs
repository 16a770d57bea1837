use larder_catalog::{AvailabilityChecker, CustomerPricing, Product};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{BackorderLine, FulfillmentLine, FulfillmentPlan, OrderRequest};

/// Decides, per requested line, how much can be fulfilled right now.
///
/// Planning has no side effects: a rejected plan leaves every store untouched,
/// and every line is decided before any reservation is attempted.
#[derive(Clone)]
pub struct FulfillmentPlanner {
    availability: AvailabilityChecker,
}

impl FulfillmentPlanner {
    pub fn new(availability: AvailabilityChecker) -> Self {
        Self { availability }
    }

    pub async fn plan(
        &self,
        request: &OrderRequest,
        products: &HashMap<Uuid, Product>,
        pricing: &CustomerPricing,
    ) -> Result<FulfillmentPlan, OrderError> {
        let mut plan = FulfillmentPlan::default();

        for requested in &request.items {
            let product = products
                .get(&requested.product_id)
                .ok_or(OrderError::ProductNotFound(requested.product_id))?;
            let available = self.availability.available(product.id).await?;

            let fulfilled = if available >= requested.quantity {
                requested.quantity
            } else if request.allow_backorder {
                plan.backorders.push(BackorderLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested_quantity: requested.quantity,
                    available_quantity: available,
                    backorder_quantity: requested.quantity - available,
                });
                available
            } else {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: requested.quantity,
                    available,
                });
            };

            if fulfilled > 0 {
                let quote = pricing.resolve(product);
                plan.lines.push(FulfillmentLine {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: fulfilled,
                    unit_price_cents: quote.unit_price_cents,
                    discount_percentage: quote.discount_percentage,
                    total_price_cents: quote.line_total(fulfilled),
                });
            }
        }

        if plan.lines.is_empty() {
            return Err(OrderError::NothingAvailable);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestedLine;
    use chrono::Utc;
    use larder_catalog::{DiscountRule, InMemoryStockStore};
    use std::sync::Arc;

    struct Fixture {
        planner: FulfillmentPlanner,
        products: HashMap<Uuid, Product>,
        customer: Uuid,
    }

    fn fixture(stock: &[(&str, i32)]) -> (Fixture, Vec<Uuid>) {
        let store = Arc::new(InMemoryStockStore::new());
        let mut products = HashMap::new();
        let mut ids = Vec::new();
        for (name, on_hand) in stock {
            let product = Product::new(*name, "secos", 1000, *on_hand);
            ids.push(product.id);
            store.insert(product.clone());
            products.insert(product.id, product);
        }
        let planner = FulfillmentPlanner::new(AvailabilityChecker::new(store));
        (Fixture { planner, products, customer: Uuid::new_v4() }, ids)
    }

    fn request(customer: Uuid, lines: &[(Uuid, i32)], allow_backorder: bool) -> OrderRequest {
        OrderRequest {
            customer_id: customer,
            items: lines
                .iter()
                .map(|(product_id, quantity)| RequestedLine { product_id: *product_id, quantity: *quantity })
                .collect(),
            allow_backorder,
            notes: None,
        }
    }

    fn no_discounts(customer: Uuid) -> CustomerPricing {
        CustomerPricing::new(customer, vec![], Utc::now())
    }

    #[tokio::test]
    async fn test_full_fulfillment() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 10)]);
        let plan = f
            .planner
            .plan(&request(f.customer, &[(ids[0], 5)], false), &f.products, &no_discounts(f.customer))
            .await
            .unwrap();

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].quantity, 5);
        assert_eq!(plan.lines[0].total_price_cents, 5000);
        assert!(plan.backorders.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fulfillment_with_backorder() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 3)]);
        let plan = f
            .planner
            .plan(&request(f.customer, &[(ids[0], 5)], true), &f.products, &no_discounts(f.customer))
            .await
            .unwrap();

        assert_eq!(plan.lines[0].quantity, 3);
        assert_eq!(plan.lines[0].total_price_cents, 3000);
        let backorder = &plan.backorders[0];
        assert_eq!(
            (backorder.requested_quantity, backorder.available_quantity, backorder.backorder_quantity),
            (5, 3, 2)
        );
    }

    #[tokio::test]
    async fn test_zero_stock_line_is_backorder_only() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 4), ("Alubias 1kg", 0)]);
        let plan = f
            .planner
            .plan(
                &request(f.customer, &[(ids[0], 2), (ids[1], 6)], true),
                &f.products,
                &no_discounts(f.customer),
            )
            .await
            .unwrap();

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].product_id, ids[0]);
        assert_eq!(plan.backorders.len(), 1);
        assert_eq!(plan.backorders[0].backorder_quantity, 6);
    }

    #[tokio::test]
    async fn test_shortfall_without_backorder_reports_first_short_line() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 10), ("Alubias 1kg", 0), ("Arroz 1kg", 1)]);
        let err = f
            .planner
            .plan(
                &request(f.customer, &[(ids[0], 2), (ids[1], 2), (ids[2], 5)], false),
                &f.products,
                &no_discounts(f.customer),
            )
            .await
            .unwrap_err();

        match err {
            OrderError::InsufficientStock { product_id, product_name, requested, available } => {
                assert_eq!(product_id, ids[1]);
                assert_eq!(product_name, "Alubias 1kg");
                assert_eq!((requested, available), (2, 0));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nothing_available() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 0), ("Alubias 1kg", 0)]);
        let err = f
            .planner
            .plan(
                &request(f.customer, &[(ids[0], 1), (ids[1], 1)], true),
                &f.products,
                &no_discounts(f.customer),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::NothingAvailable));
    }

    #[tokio::test]
    async fn test_price_uses_fulfilled_quantity_and_discount() {
        let (f, ids) = fixture(&[("Lentejas 1kg", 3)]);
        let pricing = CustomerPricing::new(
            f.customer,
            vec![DiscountRule::for_product(f.customer, ids[0], 10.0)],
            Utc::now(),
        );
        let plan = f
            .planner
            .plan(&request(f.customer, &[(ids[0], 8)], true), &f.products, &pricing)
            .await
            .unwrap();

        let line = &plan.lines[0];
        assert_eq!(line.unit_price_cents, 900);
        assert_eq!(line.discount_percentage, 10.0);
        assert_eq!(line.total_price_cents, 2700);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (f, _) = fixture(&[("Lentejas 1kg", 3)]);
        let missing = Uuid::new_v4();
        let err = f
            .planner
            .plan(&request(f.customer, &[(missing, 1)], true), &f.products, &no_discounts(f.customer))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::ProductNotFound(id) if id == missing));
    }
}
