//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger::LedgerError;
use ledger::wire::ErrorBody;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every body carries a human readable `error` and a machine readable `code`.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement or lifecycle error.
    Saga(SagaError),
    /// Stock ledger error on the product service.
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                let body = serde_json::json!({ "error": msg, "code": "validation" });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        }
    }
}

fn saga_error_to_response(err: SagaError) -> Response {
    let status = match &err {
        SagaError::Validation(_) | SagaError::ShopMismatch { .. } => StatusCode::BAD_REQUEST,
        SagaError::ProductsNotFound { .. } | SagaError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InsufficientStock { .. }
        | SagaError::InvalidState { .. }
        | SagaError::OrderExpired(_) => StatusCode::CONFLICT,
        SagaError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
        SagaError::Internal(_) | SagaError::Scheduler(_) => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let body = serde_json::json!({ "error": err.to_string(), "code": err.reason() });
    (status, Json(body)).into_response()
}

fn ledger_error_to_response(err: LedgerError) -> Response {
    let status = match &err {
        LedgerError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientStock { .. } | LedgerError::HoldExists(_) => {
            StatusCode::CONFLICT
        }
        LedgerError::InvalidQuantity { .. }
        | LedgerError::InvalidProduct(_)
        | LedgerError::EmptyHold => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ErrorBody::from_error(&err))).into_response()
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
