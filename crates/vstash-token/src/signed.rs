//! Self-contained signed tokens (HS256 JWT).
//!
//! The scope travels inside the token as a regex, so these tokens need no
//! table lookup and cannot be revoked individually; they lapse at `exp`.
//!
//! # Token Format
//!
//! Standard RFC 7519 JWT:
//! - Header: `{"alg":"HS256","typ":"JWT"}`
//! - Payload: `{"path": "<regex>", "exp": <secs>?, "iat": <secs>}`
//! - Signature: HMAC-SHA256 over `base64url(header).base64url(payload)`

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// JWT header (static for HS256)
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignedTokenError {
    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Invalid base64 encoding")]
    InvalidBase64,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Signing key rejected")]
    InvalidKey,
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaims {
    /// Regex over rooted request paths (`/dir/file`)
    pub path: String,
    /// Expiry, Unix seconds; absent means the token never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at, Unix seconds
    #[serde(default)]
    pub iat: i64,
}

impl SignedClaims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| now.timestamp() > exp)
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// HMAC key for minting and verifying signed tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Whether a token id has the three-part shape of a JWT.
    pub fn looks_signed(token: &str) -> bool {
        token.split('.').count() == 3
    }

    fn mac(&self) -> Result<HmacSha256, SignedTokenError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| SignedTokenError::InvalidKey)
    }

    /// Encode and sign.
    pub fn encode(&self, claims: &SignedClaims) -> Result<String, SignedTokenError> {
        let header_b64 = URL_SAFE_NO_PAD.encode(JWT_HEADER);
        let payload_json =
            serde_json::to_vec(claims).map_err(|e| SignedTokenError::InvalidJson(e.to_string()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);

        let signing_input = format!("{header_b64}.{payload_b64}");
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SignedClaims, SignedTokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(SignedTokenError::InvalidFormat);
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| SignedTokenError::InvalidBase64)?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|e| SignedTokenError::InvalidJson(e.to_string()))?;
        if header.alg != "HS256" {
            return Err(SignedTokenError::UnsupportedAlgorithm(header.alg));
        }

        // Signature first; nothing in the payload is trusted before this.
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SignedTokenError::InvalidBase64)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SignedTokenError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SignedTokenError::InvalidBase64)?;
        let claims: SignedClaims = serde_json::from_slice(&payload)
            .map_err(|e| SignedTokenError::InvalidJson(e.to_string()))?;

        if claims.is_expired(now) {
            return Err(SignedTokenError::Expired);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner(..)")
    }
}

impl Drop for TokenSigner {
    fn drop(&mut self) {
        self.key.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn claims(exp: Option<i64>) -> SignedClaims {
        SignedClaims {
            path: "^/uploads/.*$".into(),
            exp,
            iat: now().timestamp(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let signer = TokenSigner::new("aezakmi");
        let token = signer.encode(&claims(None)).unwrap();
        assert!(TokenSigner::looks_signed(&token));
        assert_eq!(signer.decode(&token, now()).unwrap(), claims(None));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenSigner::new("a").encode(&claims(None)).unwrap();
        assert_eq!(
            TokenSigner::new("b").decode(&token, now()),
            Err(SignedTokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = TokenSigner::new("k");
        let token = signer.encode(&claims(None)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(r#"{"path":".*","iat":0}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert_eq!(
            signer.decode(&forged, now()),
            Err(SignedTokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_alg_none_rejected() {
        let signer = TokenSigner::new("k");
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{"path":".*","iat":0}"#);
        let token = format!("{header}.{payload}.");
        assert!(matches!(
            signer.decode(&token, now()),
            Err(SignedTokenError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_expiry() {
        let signer = TokenSigner::new("k");
        let exp = now().timestamp() + 60;
        let token = signer.encode(&claims(Some(exp))).unwrap();

        assert!(signer.decode(&token, now()).is_ok());
        assert!(signer.decode(&token, now() + Duration::seconds(60)).is_ok());
        assert_eq!(
            signer.decode(&token, now() + Duration::seconds(61)),
            Err(SignedTokenError::Expired)
        );
    }

    #[test]
    fn test_malformed() {
        let signer = TokenSigner::new("k");
        assert_eq!(signer.decode("abc", now()), Err(SignedTokenError::InvalidFormat));
        assert_eq!(
            signer.decode("a.b.c.d", now()),
            Err(SignedTokenError::InvalidFormat)
        );
        assert_eq!(signer.decode("!!.b.c", now()), Err(SignedTokenError::InvalidBase64));
        assert!(!TokenSigner::looks_signed("0b6f1c4e-uuid-like"));
    }
}
