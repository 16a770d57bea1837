use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Json, Router,
    http::Method,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod orders;
pub mod state;

pub use state::{AppState, AuthConfig};

use crate::middleware::{customer_auth_middleware, staff_auth_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer_routes = Router::new()
        .route("/orders", post(orders::place_order).get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route_layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let staff_routes = Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}", get(admin::get_order))
        .route("/orders/{id}/status", patch(admin::update_order_status))
        .route("/orders/{id}/payment", patch(admin::update_payment_status))
        .route("/customers/{id}/approve", post(admin::approve_customer))
        .route("/customers/{id}/discounts", get(admin::list_discounts).post(admin::create_discount))
        .route("/stock/adjustments", post(admin::adjust_stock))
        .route("/stock/low", get(admin::low_stock))
        .route_layer(from_fn_with_state(state.clone(), staff_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(customer_routes)
        .nest("/admin", staff_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
