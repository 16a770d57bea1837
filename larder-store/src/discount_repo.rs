use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larder_catalog::{DiscountRepository, DiscountRule};
use larder_core::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::db_error;

pub struct PgDiscountRepository {
    pool: PgPool,
}

impl PgDiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRuleRow {
    id: Uuid,
    customer_id: Uuid,
    product_id: Option<Uuid>,
    category: Option<String>,
    discount_percentage: f64,
    is_active: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<DiscountRuleRow> for DiscountRule {
    fn from(row: DiscountRuleRow) -> Self {
        DiscountRule {
            id: row.id,
            customer_id: row.customer_id,
            product_id: row.product_id,
            category: row.category,
            discount_percentage: row.discount_percentage,
            is_active: row.is_active,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl DiscountRepository for PgDiscountRepository {
    async fn rules_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<DiscountRule>> {
        let rows: Vec<DiscountRuleRow> = sqlx::query_as(
            r#"
            SELECT id, customer_id, product_id, category, discount_percentage, is_active,
                   valid_from, valid_until, created_at
            FROM discount_rules
            WHERE customer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(DiscountRule::from).collect())
    }

    async fn create_rule(&self, rule: &DiscountRule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discount_rules (id, customer_id, product_id, category, discount_percentage, is_active, valid_from, valid_until, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(rule.id)
        .bind(rule.customer_id)
        .bind(rule.product_id)
        .bind(&rule.category)
        .bind(rule.discount_percentage)
        .bind(rule.is_active)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
