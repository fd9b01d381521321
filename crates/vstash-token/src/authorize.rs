//! Per-request authorization: (token id, raw path) → decision.

use std::fmt;
use std::sync::Arc;

use tracing::field::display;
use vstash_config::log_token_debug;
use vstash_path::{canonicalize, CanonicalPath};

use crate::registry::TokenRegistry;
use crate::Result;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The path failed canonicalization
    InvalidPath,
    /// Unknown, expired, forged or malformed token
    InvalidToken,
    /// The token is live but does not cover this path
    PathNotInScope,
}

impl Denial {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Denial::InvalidPath => "invalid_path",
            Denial::InvalidToken => "invalid_token",
            Denial::PathNotInScope => "path_not_in_scope",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Denial::InvalidPath => "Invalid path",
            Denial::InvalidToken => "Invalid or expired token",
            Denial::PathNotInScope => "Path is outside the token's scope",
        })
    }
}

/// An allowed request: what to touch, and where cleanup must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// The canonical path the storage layer must use
    pub path: CanonicalPath,
    /// The token's [`Scope::base_dir`](crate::Scope::base_dir)
    pub base: CanonicalPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed(Grant),
    Denied(Denial),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allowed(_))
    }
}

/// Front door for every storage request.
#[derive(Clone)]
pub struct RequestAuthorizer {
    registry: Arc<TokenRegistry>,
}

impl RequestAuthorizer {
    pub fn new(registry: Arc<TokenRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    /// Check the path first, then the token, then the scope.
    ///
    /// `Err` is reserved for token store faults; every refusal is a
    /// [`Denial`].
    pub fn authorize(&self, token_id: &str, raw_path: &str) -> Result<AuthDecision> {
        let path = match canonicalize(raw_path) {
            Ok(path) => path,
            Err(e) => {
                log_token_debug!("Rejected path", reason = display(&e));
                return Ok(AuthDecision::Denied(Denial::InvalidPath));
            }
        };

        let Some(token) = self.registry.lookup(token_id)? else {
            return Ok(AuthDecision::Denied(Denial::InvalidToken));
        };

        if !token.scope.matches(&path) {
            log_token_debug!(
                "Path outside scope",
                path = display(&path),
                scope = display(&token.scope)
            );
            return Ok(AuthDecision::Denied(Denial::PathNotInScope));
        }

        Ok(AuthDecision::Allowed(Grant {
            path,
            base: token.scope.base_dir(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registry::Ttl;
    use crate::scope::{Scope, ScopeKind};
    use crate::signed::TokenSigner;
    use crate::store::{MemoryTokenStore, TokenStore};
    use chrono::DateTime;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryTokenStore>,
        clock: Arc<ManualClock>,
        authorizer: RequestAuthorizer,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryTokenStore::new());
            let clock = Arc::new(ManualClock::new(
                DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            ));
            let registry = TokenRegistry::new(store.clone(), clock.clone())
                .with_signer(TokenSigner::new("test-secret"));
            Self {
                store,
                clock,
                authorizer: RequestAuthorizer::new(Arc::new(registry)),
            }
        }

        fn issue(&self, kind: ScopeKind, path: &str, ttl: Ttl) -> String {
            let scope = Scope::grant(kind, path).unwrap();
            self.authorizer.registry().issue(scope, ttl).unwrap().id
        }

        fn check(&self, token: &str, path: &str) -> AuthDecision {
            self.authorizer.authorize(token, path).unwrap()
        }
    }

    fn allowed(path: &str, base: &str) -> AuthDecision {
        AuthDecision::Allowed(Grant {
            path: canonicalize(path).unwrap(),
            base: canonicalize(base).unwrap(),
        })
    }

    #[test]
    fn test_directory_grant() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::Directory, "docs", Ttl::Never);

        assert_eq!(f.check(&t, "docs/a.txt"), allowed("docs/a.txt", "docs"));
        assert_eq!(
            f.check(&t, "/docs/sub/b.txt"),
            allowed("docs/sub/b.txt", "docs")
        );
        assert_eq!(f.check(&t, "docs"), allowed("docs", "docs"));
        assert_eq!(
            f.check(&t, "docs2/a.txt"),
            AuthDecision::Denied(Denial::PathNotInScope)
        );
    }

    #[test]
    fn test_file_grant() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::File, "report.pdf", Ttl::Never);

        assert_eq!(f.check(&t, "report.pdf"), allowed("report.pdf", ""));
        assert_eq!(
            f.check(&t, "report.pdf.bak"),
            AuthDecision::Denied(Denial::PathNotInScope)
        );
        assert_eq!(f.check(&t, ""), AuthDecision::Denied(Denial::PathNotInScope));
    }

    #[test]
    fn test_root_grant_covers_root() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::Root, "", Ttl::Never);
        assert_eq!(f.check(&t, ""), allowed("", ""));
        assert_eq!(f.check(&t, "/"), allowed("", ""));
        assert_eq!(f.check(&t, "any/thing"), allowed("any/thing", ""));
    }

    #[test]
    fn test_traversal_denied_before_token_lookup() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::Directory, "docs", Ttl::Never);

        assert_eq!(
            f.check(&t, "docs/../secret"),
            AuthDecision::Denied(Denial::InvalidPath)
        );
        // Path is judged even when the token is bogus
        assert_eq!(
            f.check("nope", "../../etc/passwd"),
            AuthDecision::Denied(Denial::InvalidPath)
        );
        assert_eq!(
            f.check(&t, "docs/a\0b"),
            AuthDecision::Denied(Denial::InvalidPath)
        );
    }

    #[test]
    fn test_expired_and_unknown_are_indistinguishable() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::Root, "", Ttl::For(Duration::from_secs(60)));
        assert!(f.check(&t, "a").is_allowed());

        f.clock.advance(chrono::Duration::seconds(61));

        let expired = f.check(&t, "a");
        let unknown = f.check("never-issued", "a");
        assert_eq!(expired, AuthDecision::Denied(Denial::InvalidToken));
        assert_eq!(expired, unknown);
        assert!(f.store.get(&t).unwrap().is_none());
    }

    #[test]
    fn test_revoked_token_denied() {
        let f = Fixture::new();
        let t = f.issue(ScopeKind::Root, "", Ttl::Never);
        f.authorizer.registry().revoke(&t).unwrap();
        assert_eq!(f.check(&t, "a"), AuthDecision::Denied(Denial::InvalidToken));
    }

    #[test]
    fn test_signed_token_scope() {
        let f = Fixture::new();
        let jwt = f
            .authorizer
            .registry()
            .sign(r"^/public/.*$", Ttl::Never)
            .unwrap();

        assert_eq!(
            f.check(&jwt, "public/logo.png"),
            allowed("public/logo.png", "")
        );
        assert_eq!(
            f.check(&jwt, "private/keys"),
            AuthDecision::Denied(Denial::PathNotInScope)
        );

        let mut forged = jwt.clone();
        forged.push('x');
        assert_eq!(
            f.check(&forged, "public/logo.png"),
            AuthDecision::Denied(Denial::InvalidToken)
        );
    }

    #[test]
    fn test_denial_codes() {
        assert_eq!(Denial::InvalidPath.code(), "invalid_path");
        assert_eq!(Denial::InvalidToken.code(), "invalid_token");
        assert_eq!(Denial::PathNotInScope.code(), "path_not_in_scope");
    }
}
