//! Token administration: issue, list, revoke.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{middleware, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use vstash_config::log_http_info;
use vstash_token::{Scope, ScopeKind, Token, Ttl};

use crate::error::ApiError;
use crate::middleware::admin_auth;
use crate::state::ServerState;

pub fn create_router(state: ServerState) -> Router<ServerState> {
    Router::new()
        .route("/tokens", get(list_tokens).post(issue_token))
        .route("/tokens/:id", delete(revoke_token))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}

/// Body of `POST /admin/tokens`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssueRequest {
    /// Prefix grant; `""` or absent means the whole tree
    pub path: Option<String>,
    pub kind: Option<ScopeKind>,
    /// Regex grant over rooted paths; takes precedence over `path`
    pub pattern: Option<String>,
    /// Absent or zero: never expires
    pub ttl_secs: Option<u64>,
    /// Mint a self-contained signed token instead of a stored one
    pub signed: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub token: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ScopeKind>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Token> for TokenView {
    fn from(token: Token) -> Self {
        Self {
            scope: token.scope.to_string(),
            kind: token.scope.kind(),
            expires_at: token.expiry.as_datetime(),
            created_at: token.created_at,
            token: token.id,
        }
    }
}

async fn issue_token(
    State(state): State<ServerState>,
    Json(req): Json<IssueRequest>,
) -> Result<Response, ApiError> {
    let ttl = Ttl::from_secs(req.ttl_secs);

    if req.signed {
        let Some(pattern) = req.pattern else {
            return Err(ApiError::BadRequest(
                "signed tokens need a pattern".to_string(),
            ));
        };
        let jwt = state
            .with_registry(move |registry| registry.sign(&pattern, ttl))
            .await?;
        // Report what was embedded, read back through the verifier.
        let view = state
            .with_registry(move |registry| registry.lookup(&jwt))
            .await?
            .map(TokenView::from)
            .ok_or_else(|| ApiError::Internal("minted token failed to verify".to_string()))?;
        log_http_info!("Signed token minted via admin API");
        return Ok((StatusCode::CREATED, Json(view)).into_response());
    }

    let scope = match (req.pattern, req.kind) {
        (Some(pattern), _) => Scope::pattern(&pattern)?,
        (None, Some(kind)) => Scope::grant(kind, req.path.as_deref().unwrap_or(""))?,
        (None, None) => Scope::from_convention(req.path.as_deref().unwrap_or(""))?,
    };
    let token = state
        .with_registry(move |registry| registry.issue(scope, ttl))
        .await?;
    log_http_info!("Token issued via admin API");
    Ok((StatusCode::CREATED, Json(TokenView::from(token))).into_response())
}

async fn list_tokens(State(state): State<ServerState>) -> Result<Json<Vec<TokenView>>, ApiError> {
    let tokens = state.with_registry(|registry| registry.list()).await?;
    Ok(Json(tokens.into_iter().map(TokenView::from).collect()))
}

async fn revoke_token(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .with_registry(move |registry| registry.revoke(&id))
        .await?;
    Ok(Json(json!({ "success": true })))
}
