use async_trait::async_trait;
use larder_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

/// A business customer as seen by the ordering engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub business_name: String,
    pub email: Masked<String>,
    pub is_approved: bool,
}

impl Customer {
    pub fn new(business_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_name: business_name.into(),
            email: Masked::new(email.into()),
            is_approved: false,
        }
    }

    pub fn approved(mut self) -> Self {
        self.is_approved = true;
        self
    }
}

/// Read side of the identity provider plus the one flag staff may flip.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>>;

    /// Returns `false` when the customer does not exist.
    async fn set_approved(&self, id: Uuid, approved: bool) -> StoreResult<bool>;
}

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<Uuid, Customer>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        if let Ok(mut customers) = self.customers.write() {
            customers.insert(customer.id, customer);
        }
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        let customers = self
            .customers
            .read()
            .map_err(|_| StoreError::Database("customer directory lock poisoned".into()))?;
        Ok(customers.get(&id).cloned())
    }

    async fn set_approved(&self, id: Uuid, approved: bool) -> StoreResult<bool> {
        let mut customers = self
            .customers
            .write()
            .map_err(|_| StoreError::Database("customer directory lock poisoned".into()))?;

        match customers.get_mut(&id) {
            Some(customer) => {
                customer.is_approved = approved;
                tracing::info!("Customer {} approval set to {}", id, approved);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
