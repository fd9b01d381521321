//! Token issuance, lookup, revocation and expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::field::{debug, display};
use uuid::Uuid;
use vstash_config::{log_token_debug, log_token_info, log_token_warn};

use crate::clock::Clock;
use crate::scope::Scope;
use crate::signed::{SignedClaims, TokenSigner};
use crate::store::TokenStore;
use crate::token::{Expiry, Token};
use crate::{Result, TokenError};

/// Requested lifetime of a new token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Never,
    For(Duration),
}

impl Ttl {
    /// `None` or zero seconds mean "never expires".
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            None | Some(0) => Ttl::Never,
            Some(s) => Ttl::For(Duration::from_secs(s)),
        }
    }
}

/// Owns the token table. Shared between request handlers and the sweeper.
pub struct TokenRegistry {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    signer: Option<TokenSigner>,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            signer: None,
        }
    }

    /// Accept (and allow minting) signed tokens under this secret.
    pub fn with_signer(mut self, signer: TokenSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn signing_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Whole seconds: stored timestamps carry no fraction.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(0)
    }

    fn expiry_for(now: DateTime<Utc>, ttl: Ttl) -> Result<Expiry> {
        match ttl {
            Ttl::Never => Ok(Expiry::Never),
            Ttl::For(d) => {
                let d = chrono::Duration::from_std(d)
                    .map_err(|e| TokenError::InvalidTtl(e.to_string()))?;
                let at = now
                    .checked_add_signed(d)
                    .ok_or_else(|| TokenError::InvalidTtl("out of range".to_string()))?;
                Ok(Expiry::At(at))
            }
        }
    }

    /// Create and persist a token with a fresh random id.
    pub fn issue(&self, scope: Scope, ttl: Ttl) -> Result<Token> {
        let now = self.now();
        let token = Token {
            id: Uuid::new_v4().to_string(),
            scope,
            expiry: Self::expiry_for(now, ttl)?,
            created_at: now,
        };
        self.store.put(&token.id, &token.record())?;
        log_token_info!(
            "Issued token",
            scope = display(&token.scope),
            expires = debug(token.expiry.as_datetime())
        );
        Ok(token)
    }

    /// Mint a signed token carrying a regex scope. Nothing is stored.
    pub fn sign(&self, pattern: &str, ttl: Ttl) -> Result<String> {
        let signer = self.signer.as_ref().ok_or(TokenError::SigningDisabled)?;
        // Refuse patterns that would never verify.
        Scope::pattern(pattern)?;
        let now = self.now();
        let claims = SignedClaims {
            path: pattern.to_string(),
            exp: Self::expiry_for(now, ttl)?.as_datetime().map(|at| at.timestamp()),
            iat: now.timestamp(),
        };
        let token = signer.encode(&claims)?;
        log_token_info!("Signed token", pattern = pattern);
        Ok(token)
    }

    /// Resolve a token id to a live token.
    ///
    /// Unknown, expired, forged and malformed tokens all come back as `None`.
    /// An expired stored record is deleted on the way out.
    pub fn lookup(&self, id: &str) -> Result<Option<Token>> {
        if TokenSigner::looks_signed(id) {
            return Ok(self.verify_signed(id));
        }

        let Some(record) = self.store.get(id)? else {
            return Ok(None);
        };
        let token = Token::from_record(id, record);
        if token.is_expired(self.clock.now()) {
            self.store.delete(id)?;
            log_token_debug!("Evicted expired token on lookup");
            return Ok(None);
        }
        Ok(Some(token))
    }

    fn verify_signed(&self, id: &str) -> Option<Token> {
        let signer = self.signer.as_ref()?;
        let now = self.clock.now();
        let claims = match signer.decode(id, now) {
            Ok(claims) => claims,
            Err(e) => {
                log_token_debug!("Signed token rejected", reason = display(&e));
                return None;
            }
        };
        let scope = match Scope::pattern(&claims.path) {
            Ok(scope) => scope,
            Err(e) => {
                log_token_warn!("Signed token carries an invalid pattern", error = display(&e));
                return None;
            }
        };
        let expiry = match claims.exp.and_then(|exp| chrono::DateTime::from_timestamp(exp, 0)) {
            Some(at) => Expiry::At(at),
            None => Expiry::Never,
        };
        Some(Token {
            id: id.to_string(),
            scope,
            expiry,
            created_at: chrono::DateTime::from_timestamp(claims.iat, 0).unwrap_or(now),
        })
    }

    /// Remove a token. Revoking an unknown id is not an error.
    pub fn revoke(&self, id: &str) -> Result<()> {
        if TokenSigner::looks_signed(id) {
            return Err(TokenError::NotRevocable(
                "signed tokens lapse at their expiry".to_string(),
            ));
        }
        if self.store.delete(id)? {
            log_token_info!("Revoked token");
        }
        Ok(())
    }

    /// All stored tokens, expired ones included, oldest first.
    pub fn list(&self) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .store
            .entries()?
            .into_iter()
            .map(|(id, record)| Token::from_record(id, record))
            .collect();
        tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tokens)
    }

    /// Delete every stored token past its expiry. Returns how many went.
    pub fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for (id, record) in self.store.entries()? {
            if record.expiry.is_expired(now) && self.store.delete(&id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            log_token_info!("Swept expired tokens", count = removed);
        }
        Ok(removed)
    }
}
