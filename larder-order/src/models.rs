use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::OrderError;

const MAX_NOTES_LEN: usize = 1000;
/// Largest quantity accepted on one order line.
pub const MAX_LINE_QUANTITY: i32 = 100_000;
const MAX_ORDER_LINES: usize = 500;

/// Order status in the fulfillment lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Prepared,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Prepared => "prepared",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "prepared" => Ok(OrderStatus::Prepared),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::Validation(format!("unknown order status: {}", other))),
        }
    }
}

/// Payment flag, independent of the fulfillment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(OrderError::Validation(format!("unknown payment status: {}", other))),
        }
    }
}

/// One requested (product, quantity) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// What a customer asked for. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: Uuid,
    pub items: Vec<RequestedLine>,
    #[serde(default)]
    pub allow_backorder: bool,
    pub notes: Option<String>,
}

impl OrderRequest {
    /// Shape checks only; nothing here touches a store.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("order must contain at least one item".into()));
        }
        if self.items.len() > MAX_ORDER_LINES {
            return Err(OrderError::Validation(format!("order exceeds {} lines", MAX_ORDER_LINES)));
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for line in &self.items {
            if line.quantity < 1 {
                return Err(OrderError::Validation(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(OrderError::Validation(format!(
                    "quantity for product {} exceeds {}",
                    line.product_id, MAX_LINE_QUANTITY
                )));
            }
            if !seen.insert(line.product_id) {
                return Err(OrderError::Validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
        }

        if matches!(&self.notes, Some(notes) if notes.chars().count() > MAX_NOTES_LEN) {
            return Err(OrderError::Validation(format!("notes exceed {} characters", MAX_NOTES_LEN)));
        }
        Ok(())
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|line| line.product_id).collect()
    }
}

/// Quantity actually reserved for one product, priced on that quantity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FulfillmentLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub discount_percentage: f64,
    pub total_price_cents: i64,
}

/// Shortfall recorded at planning time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackorderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub requested_quantity: i32,
    pub available_quantity: i32,
    pub backorder_quantity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FulfillmentPlan {
    pub lines: Vec<FulfillmentLine>,
    pub backorders: Vec<BackorderLine>,
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount_cents: i64,
    pub total_items: i32,
    pub has_backorder: bool,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub backorder_items: Vec<BackorderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Build a pending order from a plan. Totals are derived from the items,
    /// never supplied by the caller.
    pub fn from_plan(
        customer_id: Uuid,
        plan: &FulfillmentPlan,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let id = Uuid::new_v4();
        let items: Vec<OrderItem> = plan.lines.iter().map(|line| OrderItem::from_line(id, line)).collect();
        let backorder_items: Vec<BackorderItem> = plan
            .backorders
            .iter()
            .map(|line| BackorderItem::from_line(id, line))
            .collect();

        let total_amount_cents = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.total_price_cents))
            .ok_or_else(|| OrderError::Validation("order amount out of range".into()))?;
        let total_items = items
            .iter()
            .try_fold(0i32, |acc, item| acc.checked_add(item.quantity))
            .ok_or_else(|| OrderError::Validation("order item count out of range".into()))?;

        Ok(Self {
            id,
            customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount_cents,
            total_items,
            has_backorder: !backorder_items.is_empty(),
            notes,
            items,
            backorder_items,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            prepared_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        })
    }

    /// Record a status change that the ledger has already accepted.
    pub fn apply_status(&mut self, change: &StatusChange) {
        self.status = change.to;
        self.updated_at = change.at;
        match change.to {
            OrderStatus::Confirmed => self.confirmed_at = Some(change.at),
            OrderStatus::Prepared => self.prepared_at = Some(change.at),
            OrderStatus::Delivered => self.delivered_at = Some(change.at),
            OrderStatus::Cancelled => {
                self.cancelled_at = Some(change.at);
                self.cancellation_reason = change.reason.clone();
            }
            OrderStatus::Pending => {}
        }
    }

    /// Take back a cancellation: the order returns to `to` with no
    /// cancellation recorded.
    pub fn reopen(&mut self, to: OrderStatus, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        self.cancelled_at = None;
        self.cancellation_reason = None;
    }
}

/// An individual product line within an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Name at order time; later product renames do not reach it.
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub discount_percentage: f64,
    pub total_price_cents: i64,
}

impl OrderItem {
    fn from_line(order_id: Uuid, line: &FulfillmentLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            discount_percentage: line.discount_percentage,
            total_price_cents: line.total_price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackorderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub requested_quantity: i32,
    pub available_quantity: i32,
    pub backorder_quantity: i32,
}

impl BackorderItem {
    fn from_line(order_id: Uuid, line: &BackorderLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            requested_quantity: line.requested_quantity,
            available_quantity: line.available_quantity,
            backorder_quantity: line.backorder_quantity,
        }
    }
}

/// A status move as written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// List query. `customer_id = None` is the staff-wide view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub limit: u32,
    pub offset: u32,
}
