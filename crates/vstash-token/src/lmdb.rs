//! LMDB-backed token table.
//!
//! One named database, `tokens`: token id → bincode-encoded [`TokenRecord`].
//! Every mutation is its own write transaction; LMDB serializes writers and
//! readers never block.

use std::path::Path;

use heed::types::{SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use crate::store::TokenStore;
use crate::token::TokenRecord;
use crate::Result;

pub struct LmdbTokenStore {
    env: Env,
    tokens: Database<Str, SerdeBincode<TokenRecord>>,
}

impl LmdbTokenStore {
    /// Token rows are small; 64MB holds far more than any deployment issues.
    const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;

    const MAX_READERS: u32 = 126;

    /// Open or create the token table in the directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment directory is owned by this process; it is
        // never opened twice within one process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let tokens = env.create_database(&mut wtxn, Some("tokens"))?;
        wtxn.commit()?;

        debug!("Opened LMDB token store at {:?}", path);

        Ok(Self { env, tokens })
    }
}

impl TokenStore for LmdbTokenStore {
    fn get(&self, id: &str) -> Result<Option<TokenRecord>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.tokens.get(&rtxn, id)?)
    }

    fn put(&self, id: &str, record: &TokenRecord) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.tokens.put(&mut wtxn, id, record)?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let existed = self.tokens.delete(&mut wtxn, id)?;
        wtxn.commit()?;
        Ok(existed)
    }

    fn entries(&self) -> Result<Vec<(String, TokenRecord)>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in self.tokens.iter(&rtxn)? {
            let (id, record) = item?;
            out.push((id.to_string(), record));
        }
        Ok(out)
    }
}
