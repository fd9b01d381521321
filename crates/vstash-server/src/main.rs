//! # vstashd
//!
//! Capability-token file store daemon and its token administration CLI.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use vstash_config::logging::{init_logging, LogLevel};
use vstash_config::path::{ensure_dir, expand_home};
use vstash_config::{log_http_info, Config, TokenBackend};
use vstash_server::{ServerConfig, ServerState};
use vstash_storage::StorageEngine;
use vstash_token::{
    spawn_sweeper, LmdbTokenStore, MemoryTokenStore, Scope, ScopeKind, SystemClock, TokenRegistry,
    TokenSigner, TokenStore, Ttl,
};

/// vstash - token-scoped file storage over HTTP
#[derive(Parser)]
#[command(name = "vstashd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.vstash/config.toml then .vstash/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve {
        /// Listen address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Storage root directory
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Manage tokens in the token database
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a token scoped to a path
    Issue {
        /// `""` or `/` for everything, `dir/` for a directory, otherwise one file
        #[arg(value_name = "PATH")]
        path: String,

        /// Override the kind inferred from PATH
        #[arg(long, value_parser = parse_kind)]
        kind: Option<ScopeKind>,

        /// Lifetime in seconds (0 or absent: never expires)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Mint a signed token carrying a regex scope
    Sign {
        #[arg(value_name = "PATTERN")]
        pattern: String,

        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Revoke a token
    Revoke {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// List stored tokens
    List,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a config file holding the defaults
    Init {
        /// Write ~/.vstash/config.toml instead of .vstash/config.toml
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_kind(s: &str) -> Result<ScopeKind, String> {
    match s {
        "root" => Ok(ScopeKind::Root),
        "directory" | "dir" => Ok(ScopeKind::Directory),
        "file" => Ok(ScopeKind::File),
        other => Err(format!("unknown kind '{other}' (root, directory, file)")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        root: None,
    }) {
        Commands::Serve { bind, root } => serve(config, bind, root).await,
        Commands::Token { command } => token_command(&config, command),
        Commands::Config {
            command: ConfigCommands::Show,
        } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Config {
            command: ConfigCommands::Init { global, force },
        } => init_config(global, force),
    }
}

fn init_config(global: bool, force: bool) -> Result<()> {
    let path = if global {
        Config::global_config_path().context("No home directory for the global config")?
    } else {
        Config::project_config_path()
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(&path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.tokens.backend {
        TokenBackend::Lmdb => {
            let dir = ensure_dir(expand_home(&config.tokens.db_path))?;
            Arc::new(
                LmdbTokenStore::open(&dir)
                    .with_context(|| format!("Failed to open token database {}", dir.display()))?,
            )
        }
        TokenBackend::Memory => Arc::new(MemoryTokenStore::new()),
    };
    Ok(store)
}

fn open_registry(config: &Config) -> Result<Arc<TokenRegistry>> {
    let mut registry = TokenRegistry::new(open_store(config)?, Arc::new(SystemClock));
    if let Some(secret) = &config.tokens.signing_secret {
        registry = registry.with_signer(TokenSigner::new(secret));
    }
    Ok(Arc::new(registry))
}

async fn serve(mut config: Config, bind: Option<SocketAddr>, root: Option<PathBuf>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(root) = root {
        config.storage.root = root;
    }

    let registry = open_registry(&config)?;
    let storage = StorageEngine::open(expand_home(&config.storage.root))
        .await
        .context("Failed to open storage root")?
        .with_atomic_writes(config.storage.atomic_writes);

    if config.tokens.backend == TokenBackend::Memory {
        // Nothing to administer otherwise
        let token = registry.issue(Scope::root(), Ttl::Never)?;
        log_http_info!("In-memory token table; issued root token", token = token.id.as_str());
    }

    let sweeper = spawn_sweeper(
        Arc::clone(&registry),
        Duration::from_secs(config.tokens.sweep_interval_secs.max(1)),
    );

    let state = ServerState::new(
        registry,
        storage.clone(),
        ServerConfig {
            admin_key: config.admin.api_key.clone(),
            request_timeout_secs: config.server.request_timeout_secs,
        },
    );

    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    log_http_info!(
        "vstashd started",
        root = tracing::field::display(storage.root().display()),
        admin = config.admin.api_key.is_some()
    );

    vstash_server::serve(listener, state, shutdown_signal()).await?;
    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log_http_info!("Shutting down");
}

fn token_command(config: &Config, command: TokenCommands) -> Result<()> {
    if config.tokens.backend == TokenBackend::Memory {
        bail!("the memory token backend cannot be managed from the CLI; use the admin API");
    }
    let registry = open_registry(config)?;

    match command {
        TokenCommands::Issue { path, kind, ttl } => {
            let scope = match kind {
                Some(kind) => Scope::grant(kind, &path)?,
                None => Scope::from_convention(&path)?,
            };
            let token = registry.issue(scope, Ttl::from_secs(ttl))?;
            println!("{}", token.id);
            eprintln!("scope:   {}", token.scope);
            match token.expiry.as_datetime() {
                Some(at) => eprintln!("expires: {}", at.to_rfc3339()),
                None => eprintln!("expires: never"),
            }
        }
        TokenCommands::Sign { pattern, ttl } => {
            println!("{}", registry.sign(&pattern, Ttl::from_secs(ttl))?);
        }
        TokenCommands::Revoke { id } => {
            registry.revoke(&id)?;
            println!("Revoked {id}");
        }
        TokenCommands::List => {
            let tokens = registry.list()?;
            if tokens.is_empty() {
                println!("No tokens.");
            }
            let now = chrono::Utc::now();
            for token in tokens {
                let expiry = match token.expiry.as_datetime() {
                    Some(at) if token.is_expired(now) => format!("expired {}", at.to_rfc3339()),
                    Some(at) => at.to_rfc3339(),
                    None => "never".to_string(),
                };
                println!("{}  {:<40}  {}", token.id, token.scope.to_string(), expiry);
            }
        }
    }
    Ok(())
}
