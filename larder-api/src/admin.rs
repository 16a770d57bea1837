use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use larder_catalog::{AdjustmentRequest, DiscountRule, Product, StockAdjustment};
use larder_order::{OrderStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::StaffClaims;
use crate::orders::{parse_status, OrderListResponse, OrderResponse, TransitionResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub payment_status: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminListOrdersQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveCustomerRequest {
    #[serde(default = "default_approved")]
    pub approved: bool,
}

fn default_approved() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub business_name: String,
    pub is_approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub product_id: Option<Uuid>,
    pub category: Option<String>,
    pub discount_percentage: f64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LowStockResponse {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub on_hand: i32,
    pub min_stock: i32,
}

impl From<Product> for LowStockResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            category: p.category,
            on_hand: p.on_hand,
            min_stock: p.min_stock,
        }
    }
}

// ============================================================================
// Order Handlers
// ============================================================================

/// GET /admin/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let status = parse_status(query.status.as_deref())?;
    let filter = state.orders.filter(query.customer_id, status, query.limit, query.offset);
    let orders = state.orders.list_orders(&filter).await?;

    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(Into::into).collect(),
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// GET /admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    Ok(Json(state.orders.get_order(order_id).await?.into()))
}

/// PATCH /admin/orders/{id}/status
/// Move an order through its lifecycle; cancelling restocks
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let to: OrderStatus = req
        .status
        .parse()
        .map_err(|e: larder_order::OrderError| AppError::ValidationError(e.to_string()))?;

    let transition = state.orders.update_status(order_id, to, req.reason).await?;
    state.metrics.order_transitions.with_label_values(&[to.as_str()]).inc();
    tracing::info!("{} moved order {} to {}", claims.sub, order_id, to);

    Ok(Json(transition.into()))
}

/// PATCH /admin/orders/{id}/payment
pub async fn update_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdatePaymentRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let status: PaymentStatus = req
        .payment_status
        .parse()
        .map_err(|e: larder_order::OrderError| AppError::ValidationError(e.to_string()))?;

    let order = state.orders.update_payment_status(order_id, status).await?;
    tracing::info!("{} set payment of order {} to {}", claims.sub, order_id, status.as_str());
    Ok(Json(order.into()))
}

// ============================================================================
// Customer Handlers
// ============================================================================

/// POST /admin/customers/{id}/approve
pub async fn approve_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<ApproveCustomerRequest>,
) -> Result<Json<CustomerResponse>, AppError> {
    if !state.customers.set_approved(customer_id, req.approved).await? {
        return Err(AppError::NotFoundError(format!("Customer not found: {}", customer_id)));
    }

    let customer = state
        .customers
        .get_customer(customer_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Customer not found: {}", customer_id)))?;

    Ok(Json(CustomerResponse {
        id: customer.id,
        business_name: customer.business_name,
        is_approved: customer.is_approved,
    }))
}

/// GET /admin/customers/{id}/discounts
pub async fn list_discounts(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<DiscountRule>>, AppError> {
    Ok(Json(state.discounts.rules_for_customer(customer_id).await?))
}

/// POST /admin/customers/{id}/discounts
pub async fn create_discount(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<DiscountRule>), AppError> {
    if state.customers.get_customer(customer_id).await?.is_none() {
        return Err(AppError::NotFoundError(format!("Customer not found: {}", customer_id)));
    }

    let rule = DiscountRule {
        product_id: req.product_id,
        category: req.category,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        ..DiscountRule::general(customer_id, req.discount_percentage)
    };
    rule.validate()?;

    state.discounts.create_rule(&rule).await?;
    tracing::info!("Created {}% discount {} for customer {}", rule.discount_percentage, rule.id, customer_id);
    Ok((StatusCode::CREATED, Json(rule)))
}

// ============================================================================
// Stock Handlers
// ============================================================================

/// POST /admin/stock/adjustments
pub async fn adjust_stock(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<StockAdjustment>), AppError> {
    let adjustment = state.adjuster.apply(req).await?;
    tracing::info!(
        "{} adjusted {} by {} ({})",
        claims.sub,
        adjustment.product_id,
        adjustment.delta,
        adjustment.kind.as_str()
    );
    Ok((StatusCode::CREATED, Json(adjustment)))
}

/// GET /admin/stock/low
pub async fn low_stock(State(state): State<AppState>) -> Result<Json<Vec<LowStockResponse>>, AppError> {
    let products = state.stock.low_stock().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}
