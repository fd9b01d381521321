//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary storage root
//! - A temporary LMDB token directory
//! - A matching `Config`
//!
//! # Usage
//!
//! ```ignore
//! use vstash_config::testing::TestEnvironment;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     // env.storage_root and env.token_db are isolated per test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, TokenBackend};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Storage root served by the engine
    pub storage_root: PathBuf,
    /// LMDB environment directory for tokens
    pub token_db: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let storage_root = root.join("storage");
        let token_db = root.join(format!("tokens-{}.lmdb", test_id));

        std::fs::create_dir_all(&storage_root)?;
        std::fs::create_dir_all(&token_db)?;

        Ok(Self {
            _temp_dir: temp_dir,
            storage_root,
            token_db,
            test_id,
        })
    }

    /// Config pointing at this environment, with an in-memory token table.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.root = self.storage_root.clone();
        cfg.tokens.backend = TokenBackend::Memory;
        cfg.tokens.db_path = self.token_db.clone();
        cfg
    }

    /// Create a file under the storage root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.storage_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a directory under the storage root
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.storage_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Whether a path exists under the storage root
    pub fn exists(&self, relative_path: &str) -> bool {
        self.storage_root.join(relative_path).exists()
    }
}
