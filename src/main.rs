mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grantstore_config::{BackendKind, Config};
use grantstore_store::{InMemoryTokenStore, SqliteTokenStore, Sweeper};
use grantstore_types::{TokenKind, TokenStore, unix_now};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "grantstore", about = "grantstore: OAuth2 token store administration")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (overrides the configured storage).
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evict every expired token once.
    Purge,
    /// Print record and index counts.
    Stats,
    /// Show a stored token and its authentication.
    Show {
        /// Access or refresh token value.
        value: String,
        /// Only look in one table (`access` or `refresh`).
        #[arg(long)]
        kind: Option<TokenKind>,
    },
    /// Revoke an access token.
    RevokeAccess {
        /// Access token value.
        value: String,
    },
    /// Revoke a refresh token and the access token linked to it.
    RevokeRefresh {
        /// Refresh token value.
        value: String,
    },
    /// Run the expiry sweeper in the foreground until Ctrl-C.
    Sweep {
        /// Override the sweep interval in seconds.
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    if let Some(db) = &cli.db {
        config.storage.backend = BackendKind::Sqlite;
        config.storage.database_url = format!("sqlite://{}", db.display());
    }
    logging::init(&config.log);

    let store = open_store(&config).await?;

    match cli.command {
        Commands::Purge => cmd_purge(store.as_ref()).await,
        Commands::Stats => cmd_stats(store.as_ref()).await,
        Commands::Show { value, kind } => cmd_show(store.as_ref(), &value, kind).await,
        Commands::RevokeAccess { value } => cmd_revoke_access(store.as_ref(), &value).await,
        Commands::RevokeRefresh { value } => cmd_revoke_refresh(store.as_ref(), &value).await,
        Commands::Sweep { interval } => {
            if !config.sweep.enabled {
                tracing::warn!("sweeper disabled by configuration (sweep.enabled = false)");
                return Ok(());
            }
            let secs = interval.unwrap_or(config.sweep.interval_secs);
            cmd_sweep(store, Duration::from_secs(secs)).await
        }
    }
}

async fn cmd_purge(store: &dyn TokenStore) -> Result<()> {
    let report = store.purge_expired().await?;
    println!(
        "purged {} access token(s), {} refresh token(s)",
        report.access_tokens, report.refresh_tokens
    );
    Ok(())
}

async fn cmd_stats(store: &dyn TokenStore) -> Result<()> {
    let stats = store.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn cmd_show(store: &dyn TokenStore, value: &str, kind: Option<TokenKind>) -> Result<()> {
    if kind != Some(TokenKind::Refresh)
        && let Some(token) = store.read_access_token(value).await?
    {
        let authentication = store.read_authentication(&token).await?;
        let out = serde_json::json!({
            "kind": TokenKind::Access,
            "expires_in": token.expires_in(unix_now()),
            "token": token,
            "authentication": authentication,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if kind != Some(TokenKind::Access)
        && let Some(token) = store.read_refresh_token(value).await?
    {
        let authentication = store.read_authentication_for_refresh_token(&token).await?;
        let out = serde_json::json!({
            "kind": TokenKind::Refresh,
            "token": token,
            "authentication": authentication,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    anyhow::bail!("no live token with value '{value}'")
}

async fn cmd_revoke_access(store: &dyn TokenStore, value: &str) -> Result<()> {
    store.remove_access_token(value).await?;
    eprintln!("access token revoked");
    Ok(())
}

async fn cmd_revoke_refresh(store: &dyn TokenStore, value: &str) -> Result<()> {
    store.remove_access_token_using_refresh_token(value).await?;
    store.remove_refresh_token(value).await?;
    eprintln!("refresh token and linked access token revoked");
    Ok(())
}

async fn cmd_sweep(store: Arc<dyn TokenStore>, interval: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    let handle = Sweeper::new(store, interval).spawn(cancel.clone());
    tracing::info!(interval_secs = interval.as_secs(), "sweeper running");
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.await?;
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    match config.storage.backend {
        BackendKind::Memory => Ok(Arc::new(InMemoryTokenStore::new())),
        BackendKind::Sqlite => {
            let url = &config.storage.database_url;
            if let Some(path) = url.strip_prefix("sqlite://")
                && let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteTokenStore::new(url)
                .await
                .map_err(|e| anyhow::anyhow!("database error: {e}"))?;
            Ok(Arc::new(store))
        }
    }
}
