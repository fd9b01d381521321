//! HTTP error mapping.
//!
//! Every failure leaves the server as a stable status plus a JSON body:
//!
//! ```json
//! {"error": "path_not_in_scope", "message": "Path is outside the token's scope"}
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::task::JoinError;
use tracing::field::display;
use vstash_config::log_http_warn;
use vstash_storage::StorageError;
use vstash_token::{Denial, TokenError};

#[derive(Debug)]
pub enum ApiError {
    Denied(Denial),
    Storage(StorageError),
    Token(TokenError),
    BadRequest(String),
    /// Missing or wrong admin key
    Unauthorized,
    /// No admin key configured
    AdminDisabled,
    Internal(String),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Denied(Denial::InvalidPath) => (StatusCode::BAD_REQUEST, "invalid_path"),
            ApiError::Denied(Denial::InvalidToken) => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::Denied(Denial::PathNotInScope) => {
                (StatusCode::FORBIDDEN, "path_not_in_scope")
            }
            ApiError::Storage(e) => match e {
                StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                StorageError::IsDirectory(_) => (StatusCode::CONFLICT, "is_directory"),
                StorageError::InvalidTarget(_) => (StatusCode::CONFLICT, "invalid_target"),
                StorageError::RootDeletion => (StatusCode::FORBIDDEN, "root_deletion"),
                StorageError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            },
            ApiError::Token(e) => match e {
                TokenError::InvalidScope(_)
                | TokenError::ScopeKindMismatch(_)
                | TokenError::InvalidPattern(_)
                | TokenError::InvalidTtl(_) => (StatusCode::BAD_REQUEST, "invalid_scope"),
                TokenError::SigningDisabled => (StatusCode::BAD_REQUEST, "signing_disabled"),
                TokenError::NotRevocable(_) => (StatusCode::BAD_REQUEST, "not_revocable"),
                TokenError::Heed(_) | TokenError::Io(_) | TokenError::Signing(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "io_error")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::AdminDisabled => (StatusCode::FORBIDDEN, "admin_disabled"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Denied(d) => d.to_string(),
            ApiError::Storage(e) => e.to_string(),
            ApiError::Token(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::Unauthorized => "Admin API key required".to_string(),
            ApiError::AdminDisabled => "Admin API is disabled".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();
        if status.is_server_error() {
            log_http_warn!("Request failed", code = code, error = display(&message));
        }
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<Denial> for ApiError {
    fn from(d: Denial) -> Self {
        ApiError::Denied(d)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        ApiError::Token(e)
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstash_path::CanonicalPath;

    #[test]
    fn test_denials_map_to_distinct_statuses() {
        let cases = [
            (Denial::InvalidPath, StatusCode::BAD_REQUEST),
            (Denial::InvalidToken, StatusCode::UNAUTHORIZED),
            (Denial::PathNotInScope, StatusCode::FORBIDDEN),
        ];
        for (denial, status) in cases {
            let (got, code) = ApiError::Denied(denial).status_and_code();
            assert_eq!(got, status);
            assert_eq!(code, denial.code());
        }
    }

    #[test]
    fn test_storage_errors() {
        assert_eq!(
            ApiError::from(StorageError::RootDeletion).status_and_code(),
            (StatusCode::FORBIDDEN, "root_deletion")
        );
        assert_eq!(
            ApiError::from(StorageError::IsDirectory(CanonicalPath::root())).status_and_code(),
            (StatusCode::CONFLICT, "is_directory")
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(
            ApiError::from(StorageError::Io(io)).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
