//! # vstash-config
//!
//! Configuration management for vstash.
//!
//! Loads configuration from:
//! 1. `~/.vstash/config.toml` (global)
//! 2. `.vstash/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tokens: TokenConfig,
    pub admin: AdminConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Global config (~/.vstash/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        // 2. Project config (.vstash/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let contents = std::fs::read_to_string(&project_path)?;
            let project: PartialConfig = toml::from_str(&contents)?;
            config.merge(project);
        }

        // 3. Environment variable overrides
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a single config file without merging or env overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.vstash/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vstash/config.toml"))
    }

    /// Project config path: .vstash/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".vstash/config.toml")
    }

    /// Merge a project-level config. Only keys present in the project file win.
    fn merge(&mut self, other: PartialConfig) {
        if let Some(server) = other.server {
            if let Some(bind) = server.bind {
                self.server.bind = bind;
            }
            if let Some(secs) = server.request_timeout_secs {
                self.server.request_timeout_secs = secs;
            }
        }
        if let Some(storage) = other.storage {
            if let Some(root) = storage.root {
                self.storage.root = root;
            }
            if let Some(atomic) = storage.atomic_writes {
                self.storage.atomic_writes = atomic;
            }
        }
        if let Some(tokens) = other.tokens {
            if let Some(backend) = tokens.backend {
                self.tokens.backend = backend;
            }
            if let Some(db_path) = tokens.db_path {
                self.tokens.db_path = db_path;
            }
            if let Some(secs) = tokens.sweep_interval_secs {
                self.tokens.sweep_interval_secs = secs;
            }
            if tokens.signing_secret.is_some() {
                self.tokens.signing_secret = tokens.signing_secret;
            }
        }
        if let Some(admin) = other.admin {
            if admin.api_key.is_some() {
                self.admin.api_key = admin.api_key;
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("VSTASH_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(bind) = lookup("VSTASH_BIND") {
            self.server.bind = bind.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VSTASH_BIND",
                value: bind,
            })?;
        }
        if let Some(db) = lookup("VSTASH_TOKEN_DB") {
            self.tokens.db_path = PathBuf::from(db);
        }
        // SECRET is the variable older deployments used for the signing key.
        if let Some(secret) = lookup("VSTASH_SIGNING_SECRET").or_else(|| lookup("SECRET")) {
            if !secret.is_empty() {
                self.tokens.signing_secret = Some(secret);
            }
        }
        if let Some(key) = lookup("VSTASH_ADMIN_KEY") {
            if !key.is_empty() {
                self.admin.api_key = Some(key);
            }
        }
        Ok(())
    }

    /// Render the effective config as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Per-request timeout enforced by the transport layer
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            request_timeout_secs: 300,
        }
    }
}

/// Storage tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the served file tree
    pub root: PathBuf,
    /// Write through a temp file and rename into place
    pub atomic_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
            atomic_writes: false,
        }
    }
}

/// Token table backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    Lmdb,
    Memory,
}

/// Capability token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub backend: TokenBackend,
    /// LMDB environment directory
    pub db_path: PathBuf,
    /// Interval of the expired-token sweep
    pub sweep_interval_secs: u64,
    /// HMAC secret for signed (pattern) tokens; signed tokens are rejected when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            backend: TokenBackend::Lmdb,
            db_path: PathBuf::from("~/.vstash/tokens.lmdb"),
            sweep_interval_secs: 3600,
            signing_secret: None,
        }
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer key for `/admin` routes; the routes are disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Project-level overlay: every key optional so absent keys keep the global value.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    server: Option<PartialServer>,
    storage: Option<PartialStorage>,
    tokens: Option<PartialTokens>,
    admin: Option<PartialAdmin>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialServer {
    bind: Option<SocketAddr>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialStorage {
    root: Option<PathBuf>,
    atomic_writes: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialTokens {
    backend: Option<TokenBackend>,
    db_path: Option<PathBuf>,
    sweep_interval_secs: Option<u64>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialAdmin {
    api_key: Option<String>,
}
