use async_trait::async_trait;
use larder_core::{Customer, CustomerDirectory, StoreResult};
use larder_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::db_error;

pub struct PgCustomerDirectory {
    pool: PgPool,
}

impl PgCustomerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    business_name: String,
    email: String,
    is_approved: bool,
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        let row: Option<CustomerRow> =
            sqlx::query_as("SELECT id, business_name, email, is_approved FROM customers WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.map(|row| Customer {
            id: row.id,
            business_name: row.business_name,
            email: Masked::new(row.email),
            is_approved: row.is_approved,
        }))
    }

    async fn set_approved(&self, id: Uuid, approved: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE customers SET is_approved = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(approved)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }
}
