//! Keyed record store behind the token registry.

use dashmap::DashMap;

use crate::token::TokenRecord;
use crate::Result;

/// Persistence boundary for token records.
///
/// Records are independent, so implementations only need per-key atomicity.
/// All methods may be called concurrently from request tasks and the sweeper.
pub trait TokenStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<TokenRecord>>;

    /// Insert or replace.
    fn put(&self, id: &str, record: &TokenRecord) -> Result<()>;

    /// Remove; returns whether a record was present.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Snapshot of every record.
    fn entries(&self) -> Result<Vec<(String, TokenRecord)>>;
}

/// In-process token table
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, TokenRecord>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.get(id).map(|r| r.value().clone()))
    }

    fn put(&self, id: &str, record: &TokenRecord) -> Result<()> {
        self.tokens.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.tokens.remove(id).is_some())
    }

    fn entries(&self) -> Result<Vec<(String, TokenRecord)>> {
        Ok(self
            .tokens
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect())
    }
}
