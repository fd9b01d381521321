//! Token records as stored and as handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// When a token stops being valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    Never,
    /// Stored as a Unix timestamp in seconds
    At(#[serde(with = "chrono::serde::ts_seconds")] DateTime<Utc>),
}

impl Expiry {
    /// A token is expired strictly after its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => now > *at,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
        }
    }
}

/// Row of the token table, keyed by token id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub scope: Scope,
    pub expiry: Expiry,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// A capability: an id plus what it grants and until when
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: String,
    pub scope: Scope,
    pub expiry: Expiry,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn from_record(id: impl Into<String>, record: TokenRecord) -> Self {
        Self {
            id: id.into(),
            scope: record.scope,
            expiry: record.expiry,
            created_at: record.created_at,
        }
    }

    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            scope: self.scope.clone(),
            expiry: self.expiry,
            created_at: self.created_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_expired(now)
    }
}
