//! Service-to-service authentication for the internal stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ledger::client::API_KEY_HEADER;

/// Rejects requests without the expected `X-API-Key` header: 401 when it is
/// missing, 403 when it does not match.
pub async fn require_api_key(
    State(expected): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    match provided {
        None => reject(
            StatusCode::UNAUTHORIZED,
            "API key required for internal endpoints",
        ),
        Some(key) if key != expected.as_ref() => {
            tracing::warn!("rejected internal call with an invalid API key");
            reject(StatusCode::FORBIDDEN, "Invalid API key")
        }
        Some(_) => next.run(req).await,
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    let code = if status == StatusCode::UNAUTHORIZED {
        "unauthorized"
    } else {
        "forbidden"
    };
    (
        status,
        Json(serde_json::json!({ "error": message, "code": code })),
    )
        .into_response()
}
