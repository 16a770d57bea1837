use chrono::Utc;
use larder_catalog::{AvailabilityChecker, DiscountRepository, PriceResolver, Product, StockStore};
use larder_core::{CustomerDirectory, Notifier};
use larder_shared::{OrderEvent, OrderPlacedEvent, OrderStatusChangedEvent, PaymentStatusChangedEvent};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::OrderListCache;
use crate::error::OrderError;
use crate::ledger::{OrderLedger, OrderRepository};
use crate::models::{Order, OrderFilter, OrderRequest, OrderStatus, PaymentStatus};
use crate::planner::FulfillmentPlanner;
use crate::reservation::ReservationExecutor;
use crate::state_machine::{OrderStateMachine, Transition};

/// Tunables for the order engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfig {
    /// Extra plan + reserve rounds after a reservation conflict.
    pub reservation_retries: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            reservation_retries: 3,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Backing stores the engine runs against.
#[derive(Clone)]
pub struct OrderStores {
    pub customers: Arc<dyn CustomerDirectory>,
    pub stock: Arc<dyn StockStore>,
    pub discounts: Arc<dyn DiscountRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub cache: Arc<dyn OrderListCache>,
}

/// Order placement, lookup and lifecycle.
pub struct OrderService {
    customers: Arc<dyn CustomerDirectory>,
    stock: Arc<dyn StockStore>,
    pricing: PriceResolver,
    planner: FulfillmentPlanner,
    reservations: ReservationExecutor,
    ledger: Arc<OrderLedger>,
    state_machine: OrderStateMachine,
    notifier: Arc<dyn Notifier>,
    config: OrderConfig,
}

impl OrderService {
    pub fn new(stores: OrderStores, notifier: Arc<dyn Notifier>, config: OrderConfig) -> Self {
        let ledger = Arc::new(OrderLedger::new(stores.orders, stores.cache));
        Self {
            customers: stores.customers,
            pricing: PriceResolver::new(stores.discounts),
            planner: FulfillmentPlanner::new(AvailabilityChecker::new(stores.stock.clone())),
            reservations: ReservationExecutor::new(stores.stock.clone()),
            state_machine: OrderStateMachine::new(ledger.clone(), stores.stock.clone()),
            stock: stores.stock,
            ledger,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// Place an order: plan every line, reserve the plan all or nothing, then
    /// write the ledger. A failed ledger write puts the stock back.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, OrderError> {
        request.validate()?;

        let customer = self
            .customers
            .get_customer(request.customer_id)
            .await?
            .ok_or(OrderError::UnknownCustomer(request.customer_id))?;
        if !customer.is_approved {
            return Err(OrderError::UnapprovedCustomer(customer.id));
        }

        let products = self.load_products(&request).await?;
        let pricing = self.pricing.for_customer(customer.id, Utc::now()).await?;

        let mut attempt = 0;
        let (plan, reservation) = loop {
            let plan = self.planner.plan(&request, &products, &pricing).await?;
            match self.reservations.reserve(&plan.lines).await {
                Ok(reservation) => break (plan, reservation),
                Err(OrderError::ReservationConflict { product_id, .. })
                    if attempt < self.config.reservation_retries =>
                {
                    attempt += 1;
                    tracing::warn!(
                        "Stock for {} moved under customer {}, re-planning (attempt {})",
                        product_id,
                        customer.id,
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }
        };

        let order = match self.ledger.create(customer.id, &plan, request.notes.clone()).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("Failed to persist order for customer {}: {}. Releasing stock", customer.id, e);
                reservation.release().await;
                return Err(e);
            }
        };
        reservation.commit();

        tracing::info!(
            "Order {} placed by {}: {} items, {} cents, backorder={}",
            order.id,
            customer.id,
            order.total_items,
            order.total_amount_cents,
            order.has_backorder
        );
        self.publish(OrderEvent::Placed(OrderPlacedEvent {
            order_id: order.id,
            customer_id: order.customer_id,
            total_amount: order.total_amount_cents,
            total_items: order.total_items,
            has_backorder: order.has_backorder,
            timestamp: Utc::now().timestamp(),
        }));
        Ok(order)
    }

    async fn load_products(&self, request: &OrderRequest) -> Result<HashMap<Uuid, Product>, OrderError> {
        let ids = request.product_ids();
        let products: HashMap<Uuid, Product> = self
            .stock
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        if let Some(missing) = ids.iter().find(|id| !products.contains_key(id)) {
            return Err(OrderError::ProductNotFound(*missing));
        }
        Ok(products)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.ledger.get(order_id).await
    }

    /// Another customer's order is reported as missing.
    pub async fn get_order_for_customer(&self, customer_id: Uuid, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self.ledger.get(order_id).await?;
        if order.customer_id != customer_id {
            return Err(OrderError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Build a list filter, clamping the page size to the configured bounds.
    pub fn filter(
        &self,
        customer_id: Option<Uuid>,
        status: Option<OrderStatus>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> OrderFilter {
        OrderFilter {
            customer_id,
            status,
            limit: limit
                .unwrap_or(self.config.default_page_size)
                .clamp(1, self.config.max_page_size.max(1)),
            offset: offset.unwrap_or(0),
        }
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        self.ledger.list(filter).await
    }

    pub async fn cancel_order_for_customer(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<Transition, OrderError> {
        let order = self.get_order_for_customer(customer_id, order_id).await?;
        let transition = self
            .state_machine
            .transition_order(order, OrderStatus::Cancelled, reason)
            .await?;
        self.publish_transition(&transition);
        Ok(transition)
    }

    /// Staff status change, cancellation included.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        reason: Option<String>,
    ) -> Result<Transition, OrderError> {
        let transition = self.state_machine.transition(order_id, to, reason).await?;
        self.publish_transition(&transition);
        Ok(transition)
    }

    pub async fn update_payment_status(&self, order_id: Uuid, status: PaymentStatus) -> Result<Order, OrderError> {
        let (order, previous) = self.ledger.set_payment_status(order_id, status).await?;
        tracing::info!("Order {} payment {} -> {}", order.id, previous.as_str(), status.as_str());

        if previous != status {
            self.publish(OrderEvent::PaymentChanged(PaymentStatusChangedEvent {
                order_id: order.id,
                customer_id: order.customer_id,
                old_payment_status: previous.as_str().to_string(),
                new_payment_status: status.as_str().to_string(),
                timestamp: Utc::now().timestamp(),
            }));
        }
        Ok(order)
    }

    fn publish_transition(&self, transition: &Transition) {
        self.publish(OrderEvent::StatusChanged(OrderStatusChangedEvent {
            order_id: transition.order.id,
            customer_id: transition.order.customer_id,
            old_status: transition.from.as_str().to_string(),
            new_status: transition.order.status.as_str().to_string(),
            reason: transition.order.cancellation_reason.clone(),
            timestamp: Utc::now().timestamp(),
        }));
    }

    /// Fire and forget. A failed notification never undoes the order.
    fn publish(&self, event: OrderEvent) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!("Notification {} for order {} failed: {}", event.topic(), event.order_id(), e);
            }
        });
    }
}
