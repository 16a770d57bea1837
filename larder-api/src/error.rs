use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use larder_catalog::CatalogError;
use larder_order::OrderError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("Insufficient stock for {product_name}")]
    InsufficientStock {
        product_name: String,
        requested: i32,
        available: i32,
    },
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InsufficientStock { product_name, requested, available } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": format!("Insufficient stock for {}", product_name),
                    "product_name": product_name,
                    "requested": requested,
                    "available": available,
                }),
            ),
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InsufficientStock { product_name, requested, available, .. } => {
                AppError::InsufficientStock { product_name, requested, available }
            }
            OrderError::Validation(_) | OrderError::NothingAvailable => AppError::ValidationError(err.to_string()),
            OrderError::UnknownCustomer(_) => AppError::AuthenticationError(err.to_string()),
            OrderError::UnapprovedCustomer(_) => AppError::AuthorizationError(err.to_string()),
            OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => AppError::NotFoundError(err.to_string()),
            OrderError::ReservationConflict { .. } | OrderError::IllegalTransition { .. } => {
                AppError::ConflictError(err.to_string())
            }
            OrderError::Persistence(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            CatalogError::InsufficientStock { .. } | CatalogError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            CatalogError::Store(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<larder_core::StoreError> for AppError {
    fn from(err: larder_core::StoreError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}
