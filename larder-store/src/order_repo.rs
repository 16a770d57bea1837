use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_core::StoreResult;
use larder_order::{
    BackorderItem, Order, OrderFilter, OrderItem, OrderRepository, OrderStatus, PaymentStatus, StatusChange,
};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{corrupt, db_error};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items and backorders to already loaded headers, keeping their order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price_cents,
                   discount_percentage, total_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let backorder_rows: Vec<BackorderItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_name, requested_quantity, available_quantity,
                   backorder_quantity
            FROM backorder_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(row.into());
        }
        let mut backorders: HashMap<Uuid, Vec<BackorderItem>> = HashMap::new();
        for row in backorder_rows {
            backorders.entry(row.order_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_order(
                    items.remove(&id).unwrap_or_default(),
                    backorders.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    status: String,
    payment_status: String,
    total_amount_cents: i64,
    total_items: i32,
    has_backorder: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    prepared_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>, backorder_items: Vec<BackorderItem>) -> StoreResult<Order> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|_| corrupt("orders", "status", &self.status))?;
        let payment_status: PaymentStatus = self
            .payment_status
            .parse()
            .map_err(|_| corrupt("orders", "payment_status", &self.payment_status))?;

        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            status,
            payment_status,
            total_amount_cents: self.total_amount_cents,
            total_items: self.total_items,
            has_backorder: self.has_backorder,
            notes: self.notes,
            items,
            backorder_items,
            created_at: self.created_at,
            updated_at: self.updated_at,
            confirmed_at: self.confirmed_at,
            prepared_at: self.prepared_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            cancellation_reason: self.cancellation_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price_cents: i64,
    discount_percentage: f64,
    total_price_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            discount_percentage: row.discount_percentage,
            total_price_cents: row.total_price_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BackorderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    requested_quantity: i32,
    available_quantity: i32,
    backorder_quantity: i32,
}

impl From<BackorderItemRow> for BackorderItem {
    fn from(row: BackorderItemRow) -> Self {
        BackorderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            requested_quantity: row.requested_quantity,
            available_quantity: row.available_quantity,
            backorder_quantity: row.backorder_quantity,
        }
    }
}

const ORDER_COLUMNS: &str = "id, customer_id, status, payment_status, total_amount_cents, total_items, \
     has_backorder, notes, created_at, updated_at, confirmed_at, prepared_at, delivered_at, \
     cancelled_at, cancellation_reason";

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, payment_status, total_amount_cents, total_items, has_backorder, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_amount_cents)
        .bind(order.total_items)
        .bind(order.has_backorder)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        for (line_no, item) in (1i32..).zip(&order.items) {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, line_no, product_id, product_name, quantity, unit_price_cents, discount_percentage, total_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(line_no)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.discount_percentage)
            .bind(item.total_price_cents)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        for (line_no, backorder) in (1i32..).zip(&order.backorder_items) {
            sqlx::query(
                r#"
                INSERT INTO backorder_items (id, order_id, line_no, product_id, product_name, requested_quantity, available_quantity, backorder_quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(backorder.id)
            .bind(order.id)
            .bind(line_no)
            .bind(backorder.product_id)
            .bind(&backorder.product_name)
            .bind(backorder.requested_quantity)
            .bind(backorder.available_quantity)
            .bind(backorder.backorder_quantity)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders
             WHERE ($1::uuid IS NULL OR customer_id = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            ORDER_COLUMNS
        ))
        .bind(filter.customer_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        self.hydrate(rows).await
    }

    async fn transition(&self, id: Uuid, from: OrderStatus, change: &StatusChange) -> StoreResult<bool> {
        let stamp = |status: OrderStatus| (change.to == status).then_some(change.at);

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3,
                updated_at = $4,
                confirmed_at = COALESCE($5, confirmed_at),
                prepared_at = COALESCE($6, prepared_at),
                delivered_at = COALESCE($7, delivered_at),
                cancelled_at = COALESCE($8, cancelled_at),
                cancellation_reason = COALESCE($9, cancellation_reason)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(change.to.as_str())
        .bind(change.at)
        .bind(stamp(OrderStatus::Confirmed))
        .bind(stamp(OrderStatus::Prepared))
        .bind(stamp(OrderStatus::Delivered))
        .bind(stamp(OrderStatus::Cancelled))
        .bind(&change.reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reopen(&self, id: Uuid, to: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $2,
                updated_at = $3,
                cancelled_at = NULL,
                cancellation_reason = NULL
            WHERE id = $1 AND status = 'cancelled'
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PaymentStatus>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let previous: Option<String> = sqlx::query_scalar("SELECT payment_status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let Some(previous) = previous else {
            return Ok(None);
        };
        let previous: PaymentStatus = previous
            .parse()
            .map_err(|_| corrupt("orders", "payment_status", &previous))?;

        sqlx::query("UPDATE orders SET payment_status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(Some(previous))
    }
}
