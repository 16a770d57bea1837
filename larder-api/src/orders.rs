use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use larder_order::{BackorderItem, Order, OrderItem, OrderRequest, OrderStatus, RequestedLine, Transition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CustomerClaims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<RequestedLine>,
    #[serde(default)]
    pub allow_backorder: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Amounts are integer cents.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: String,
    pub total_amount: i64,
    pub total_items: i32,
    pub has_backorder: bool,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub backorder_items: Vec<BackorderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

/// Body of a successful placement.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlacedOrderResponse {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub order: OrderResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub discount_percentage: f64,
    pub total_price: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackorderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub requested_quantity: i32,
    pub available_quantity: i32,
    pub backorder_quantity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestockedResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_restored: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    pub previous_status: OrderStatus,
    pub restocked: Vec<RestockedResponse>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price_cents,
            discount_percentage: item.discount_percentage,
            total_price: item.total_price_cents,
        }
    }
}

impl From<BackorderItem> for BackorderItemResponse {
    fn from(item: BackorderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            requested_quantity: item.requested_quantity,
            available_quantity: item.available_quantity,
            backorder_quantity: item.backorder_quantity,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            payment_status: order.payment_status.as_str().to_string(),
            total_amount: order.total_amount_cents,
            total_items: order.total_items,
            has_backorder: order.has_backorder,
            notes: order.notes,
            items: order.items.into_iter().map(Into::into).collect(),
            backorder_items: order.backorder_items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            confirmed_at: order.confirmed_at,
            prepared_at: order.prepared_at,
            delivered_at: order.delivered_at,
            cancelled_at: order.cancelled_at,
            cancellation_reason: order.cancellation_reason,
        }
    }
}

impl From<Transition> for TransitionResponse {
    fn from(transition: Transition) -> Self {
        Self {
            previous_status: transition.from,
            restocked: transition
                .restocked
                .into_iter()
                .map(|line| RestockedResponse {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    quantity_restored: line.quantity_restored,
                })
                .collect(),
            order: transition.order.into(),
        }
    }
}

pub(crate) fn parse_status(status: Option<&str>) -> Result<Option<OrderStatus>, AppError> {
    status
        .map(|s| s.parse::<OrderStatus>())
        .transpose()
        .map_err(|e| AppError::ValidationError(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /orders
/// Place an order for the authenticated customer
pub async fn place_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>), AppError> {
    let request = OrderRequest {
        customer_id: claims.sub,
        items: req.items,
        allow_backorder: req.allow_backorder,
        notes: req.notes,
    };

    match state.orders.place_order(request).await {
        Ok(order) => {
            state.metrics.orders_placed.inc();
            Ok((StatusCode::CREATED, Json(PlacedOrderResponse { order_id: order.id, order: order.into() })))
        }
        Err(e) => {
            state.metrics.order_rejections.with_label_values(&[e.kind()]).inc();
            tracing::info!("Order from {} rejected: {}", claims.sub, e);
            Err(e.into())
        }
    }
}

/// GET /orders
/// The customer's own orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let status = parse_status(query.status.as_deref())?;
    let filter = state.orders.filter(Some(claims.sub), status, query.limit, query.offset);
    let orders = state.orders.list_orders(&filter).await?;

    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(Into::into).collect(),
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_order_for_customer(claims.sub, order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel
/// Cancel an order that has not been prepared yet; its stock is put back.
/// The body, carrying an optional reason, may be omitted.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
    body: Option<Json<CancelOrderRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let transition = state
        .orders
        .cancel_order_for_customer(claims.sub, order_id, reason)
        .await?;

    state
        .metrics
        .order_transitions
        .with_label_values(&[OrderStatus::Cancelled.as_str()])
        .inc();
    Ok(Json(transition.into()))
}
