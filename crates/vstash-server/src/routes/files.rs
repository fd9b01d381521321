//! Token-addressed file routes: `/{token}` and `/{token}/{*path}`.
//!
//! Each handler authorizes first and hands the storage engine only the
//! canonical path the authorizer returned.

use std::io;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::field::display;
use vstash_config::{log_http_debug, log_http_info};
use vstash_path::CanonicalPath;
use vstash_token::{AuthDecision, Grant};

use crate::error::ApiError;
use crate::state::ServerState;

async fn authorized(state: &ServerState, token: String, path: String) -> Result<Grant, ApiError> {
    match state.authorize(token, path).await? {
        AuthDecision::Allowed(grant) => Ok(grant),
        AuthDecision::Denied(denial) => {
            log_http_debug!("Request denied", reason = denial.code());
            Err(denial.into())
        }
    }
}

/// `GET /{token}`: list the storage root.
pub async fn list_root(
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let grant = authorized(&state, token, String::new()).await?;
    fetch(&state, grant.path).await
}

/// `GET /{token}/{*path}`: stream a file, or list a directory.
pub async fn get_path(
    State(state): State<ServerState>,
    Path((token, raw)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let grant = authorized(&state, token, raw).await?;
    fetch(&state, grant.path).await
}

async fn fetch(state: &ServerState, path: CanonicalPath) -> Result<Response, ApiError> {
    let Some(item) = state.storage.stat(&path).await? else {
        return Err(vstash_storage::StorageError::NotFound(path).into());
    };

    if item.is_folder() {
        let items = state.storage.list(&path).await?;
        return Ok(Json(items).into_response());
    }

    let (file, len) = state.storage.read(&path).await?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    log_http_info!("Download", path = display(&path), size = len);
    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// `PUT /{token}/{*path}`: stream the request body into the file.
pub async fn put_file(
    State(state): State<ServerState>,
    Path((token, raw)): Path<(String, String)>,
    body: Body,
) -> Result<Response, ApiError> {
    let path = authorized(&state, token, raw).await?.path;

    let stream = body
        .into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let mut reader = StreamReader::new(stream);
    let size = state.storage.write(&path, &mut reader).await?;

    log_http_info!("Upload", path = display(&path), size = size);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "path": path, "size": size })),
    )
        .into_response())
}

/// `DELETE /{token}/{*path}`: cleanup of emptied parents stays inside the
/// token's scope.
pub async fn delete_path(
    State(state): State<ServerState>,
    Path((token, raw)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let Grant { path, base } = authorized(&state, token, raw).await?;
    state.storage.delete_within(&path, &base).await?;
    log_http_info!("Delete", path = display(&path));
    Ok(Json(json!({ "success": true })).into_response())
}

/// `DELETE /{token}`: always refused, the root is not deletable.
pub async fn delete_root(
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let grant = authorized(&state, token, String::new()).await?;
    state.storage.delete(&grant.path).await?;
    Ok(Json(json!({ "success": true })).into_response())
}
