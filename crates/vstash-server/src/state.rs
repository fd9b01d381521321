//! Server state shared by all handlers

use std::sync::Arc;
use std::time::Duration;

use vstash_storage::StorageEngine;
use vstash_token::{AuthDecision, RequestAuthorizer, TokenRegistry};

use crate::error::ApiError;

/// Cheap to clone; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct ServerState {
    pub authorizer: RequestAuthorizer,
    pub storage: StorageEngine,
    pub config: Arc<ServerConfig>,
}

/// Settings the router itself needs
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bearer key for `/admin`; admin routes refuse everything when unset
    pub admin_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admin_key: None,
            request_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ServerState {
    pub fn new(registry: Arc<TokenRegistry>, storage: StorageEngine, config: ServerConfig) -> Self {
        Self {
            authorizer: RequestAuthorizer::new(registry),
            storage,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        self.authorizer.registry()
    }

    /// Authorize off the async workers; the token table may be on disk.
    pub async fn authorize(&self, token: String, raw_path: String) -> Result<AuthDecision, ApiError> {
        let authorizer = self.authorizer.clone();
        let decision =
            tokio::task::spawn_blocking(move || authorizer.authorize(&token, &raw_path)).await??;
        Ok(decision)
    }

    /// Run a registry call on the blocking pool.
    pub async fn with_registry<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&TokenRegistry) -> vstash_token::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = Arc::clone(self.registry());
        Ok(tokio::task::spawn_blocking(move || f(&registry)).await??)
    }
}
