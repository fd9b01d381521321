//! # vstash-token
//!
//! Capability tokens for the vstash file store.
//!
//! A token grants access to a [`Scope`] of the storage tree rather than to an
//! identity. Two token formats share one authorization path:
//!
//! - **Registered tokens**: opaque UUIDs whose scope and expiry live in a
//!   [`TokenStore`] (LMDB on disk, or an in-memory map).
//! - **Signed tokens**: HS256 JWTs whose regex scope is embedded in the payload
//!   and verified statelessly.
//!
//! ```text
//! token id + raw path
//!        │
//!        ▼
//! RequestAuthorizer ── canonicalize ──► InvalidPath
//!        │
//!        ├── TokenRegistry::lookup ───► InvalidToken
//!        │
//!        └── Scope::matches ──────────► PathNotInScope
//!                                        │
//!                                        ▼
//!                               Allowed(Grant)
//! ```

pub mod authorize;
pub mod clock;
pub mod lmdb;
pub mod registry;
pub mod scope;
pub mod signed;
pub mod store;
pub mod sweep;
pub mod token;

pub use authorize::{AuthDecision, Denial, Grant, RequestAuthorizer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use lmdb::LmdbTokenStore;
pub use registry::{TokenRegistry, Ttl};
pub use scope::{matches, PathPattern, Scope, ScopeKind};
pub use signed::{SignedClaims, SignedTokenError, TokenSigner};
pub use store::{MemoryTokenStore, TokenStore};
pub use sweep::spawn_sweeper;
pub use token::{Expiry, Token, TokenRecord};

use thiserror::Error;
use vstash_path::PathError;

/// Errors from token issuance and the backing store
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scope path: {0}")]
    InvalidScope(#[from] PathError),

    #[error("Invalid scope: {0}")]
    ScopeKindMismatch(String),

    #[error("Invalid scope pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid ttl: {0}")]
    InvalidTtl(String),

    #[error("Signed tokens are disabled (no signing secret configured)")]
    SigningDisabled,

    #[error("Signed tokens cannot be revoked: {0}")]
    NotRevocable(String),

    #[error("Signing error: {0}")]
    Signing(#[from] SignedTokenError),
}

pub type Result<T> = std::result::Result<T, TokenError>;
