use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

/// Order engine counters, exported on `/metrics`.
pub struct ApiMetrics {
    registry: Registry,
    pub orders_placed: IntCounter,
    pub order_rejections: IntCounterVec,
    pub order_transitions: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("larder_orders_placed_total", "Orders accepted")?;
        let order_rejections = IntCounterVec::new(
            Opts::new("larder_order_rejections_total", "Order placements refused, by reason"),
            &["reason"],
        )?;
        let order_transitions = IntCounterVec::new(
            Opts::new("larder_order_transitions_total", "Accepted status changes, by target status"),
            &["to"],
        )?;

        registry.register(Box::new(orders_placed.clone()))?;
        registry.register(Box::new(order_rejections.clone()))?;
        registry.register(Box::new(order_transitions.clone()))?;

        Ok(Self { registry, orders_placed, order_rejections, order_transitions })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render_with_labels() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.orders_placed.inc();
        metrics.order_rejections.with_label_values(&["insufficient_stock"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("larder_orders_placed_total 1"));
        assert!(text.contains("larder_order_rejections_total{reason=\"insufficient_stock\"} 1"));
    }
}
