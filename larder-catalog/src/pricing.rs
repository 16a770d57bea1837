use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_core::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::product::{CatalogError, Product};

/// A customer-specific discount. Without `product_id` and `category` it is a
/// general discount over the whole catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountRule {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Option<Uuid>,
    pub category: Option<String>,
    pub discount_percentage: f64,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Specificity ranking of a matching rule. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrecedenceTier {
    General,
    Category,
    Product,
}

impl DiscountRule {
    pub fn general(customer_id: Uuid, discount_percentage: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            product_id: None,
            category: None,
            discount_percentage,
            is_active: true,
            valid_from: None,
            valid_until: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_category(customer_id: Uuid, category: impl Into<String>, discount_percentage: f64) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::general(customer_id, discount_percentage)
        }
    }

    pub fn for_product(customer_id: Uuid, product_id: Uuid, discount_percentage: f64) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::general(customer_id, discount_percentage)
        }
    }

    /// Active flag set and `now` inside the window. Missing bounds are open.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.map_or(true, |from| from <= now)
            && self.valid_until.map_or(true, |until| now <= until)
    }

    /// Tier this rule would apply at for `product`, or `None` if it does not
    /// match the product at all.
    pub fn tier_for(&self, product: &Product) -> Option<PrecedenceTier> {
        match (&self.product_id, &self.category) {
            (Some(product_id), _) => (*product_id == product.id).then_some(PrecedenceTier::Product),
            (None, Some(category)) => (*category == product.category).then_some(PrecedenceTier::Category),
            (None, None) => Some(PrecedenceTier::General),
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if !(self.discount_percentage > 0.0 && self.discount_percentage <= 100.0) {
            return Err(CatalogError::Validation(format!(
                "discount percentage must be in (0, 100], got {}",
                self.discount_percentage
            )));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(CatalogError::Validation("valid_from is after valid_until".into()));
            }
        }
        if self.product_id.is_some() && self.category.is_some() {
            return Err(CatalogError::Validation(
                "a discount targets a product or a category, not both".into(),
            ));
        }
        if matches!(&self.category, Some(c) if c.trim().is_empty()) {
            return Err(CatalogError::Validation("category must not be blank".into()));
        }
        Ok(())
    }
}

/// Effective price of one unit after the winning discount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price_cents: i64,
    pub discount_percentage: f64,
}

impl PriceQuote {
    pub fn line_total(&self, quantity: i32) -> i64 {
        self.unit_price_cents * i64::from(quantity)
    }
}

/// Apply a percentage discount to a minor-unit price, rounding half away from zero.
pub fn apply_discount(base_price_cents: i64, discount_percentage: f64) -> i64 {
    let pct = discount_percentage.clamp(0.0, 100.0);
    (base_price_cents as f64 * (100.0 - pct) / 100.0).round() as i64
}

#[async_trait]
pub trait DiscountRepository: Send + Sync {
    async fn rules_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<DiscountRule>>;
    async fn create_rule(&self, rule: &DiscountRule) -> StoreResult<()>;
}

#[derive(Default)]
pub struct InMemoryDiscountRepository {
    rules: RwLock<HashMap<Uuid, Vec<DiscountRule>>>,
}

impl InMemoryDiscountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscountRepository for InMemoryDiscountRepository {
    async fn rules_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<DiscountRule>> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StoreError::Database("discount store lock poisoned".into()))?;
        Ok(rules.get(&customer_id).cloned().unwrap_or_default())
    }

    async fn create_rule(&self, rule: &DiscountRule) -> StoreResult<()> {
        self.rules
            .write()
            .map_err(|_| StoreError::Database("discount store lock poisoned".into()))?
            .entry(rule.customer_id)
            .or_default()
            .push(rule.clone());
        Ok(())
    }
}

/// Loads a customer's discount rules once per order.
#[derive(Clone)]
pub struct PriceResolver {
    discounts: Arc<dyn DiscountRepository>,
}

impl PriceResolver {
    pub fn new(discounts: Arc<dyn DiscountRepository>) -> Self {
        Self { discounts }
    }

    pub async fn for_customer(&self, customer_id: Uuid, now: DateTime<Utc>) -> StoreResult<CustomerPricing> {
        let rules = self.discounts.rules_for_customer(customer_id).await?;
        Ok(CustomerPricing::new(customer_id, rules, now))
    }
}

/// The rule set in force for one customer at one instant. Resolution is pure,
/// so it can be repeated freely (e.g. when an order is re-planned).
#[derive(Debug, Clone)]
pub struct CustomerPricing {
    customer_id: Uuid,
    rules: Vec<DiscountRule>,
    now: DateTime<Utc>,
}

impl CustomerPricing {
    pub fn new(customer_id: Uuid, rules: Vec<DiscountRule>, now: DateTime<Utc>) -> Self {
        Self { customer_id, rules, now }
    }

    /// Product-specific beats category beats general; within a tier the
    /// highest percentage wins.
    pub fn resolve(&self, product: &Product) -> PriceQuote {
        let winner = self
            .rules
            .iter()
            .filter(|rule| rule.customer_id == self.customer_id && rule.is_active_at(self.now))
            .filter_map(|rule| rule.tier_for(product).map(|tier| (tier, rule.discount_percentage)))
            .max_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

        match winner {
            Some((_, pct)) => PriceQuote {
                unit_price_cents: apply_discount(product.base_price_cents, pct),
                discount_percentage: pct,
            },
            None => PriceQuote {
                unit_price_cents: product.base_price_cents,
                discount_percentage: 0.0,
            },
        }
    }
}
