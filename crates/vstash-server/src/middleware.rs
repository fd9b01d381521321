//! Admin authentication

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use vstash_config::log_http_warn;

use crate::error::ApiError;
use crate::state::ServerState;

/// Require `Authorization: Bearer <admin key>` (or `X-API-Key`) on admin routes.
pub async fn admin_auth(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.admin_key.as_deref() else {
        return ApiError::AdminDisabled.into_response();
    };

    let verdict = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
        })
        .map(|key| key == expected);

    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => {
            log_http_warn!("Invalid admin key attempt");
            ApiError::Unauthorized.into_response()
        }
        None => ApiError::Unauthorized.into_response(),
    }
}
