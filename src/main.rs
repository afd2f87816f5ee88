use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discord_channel_mirror::config::Config;
use discord_channel_mirror::db::{ensure_schema, Backend, Database};
use discord_channel_mirror::discord::DiscordConnector;
use discord_channel_mirror::sync::SyncLoop;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting discord-channel-mirror");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        channel_id = %config.channel_id,
        backend = config.backend.as_str(),
        embeds = config.store_embeds,
        "Configuration loaded"
    );

    if config.backend == Backend::Sqlite {
        if let Some(parent) = config.database_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let db = Database::connect(
        &config.database_url(),
        config.store_profile(),
        config.max_connections,
    )
    .await
    .context("Failed to initialize store")?;

    let report = ensure_schema(&db)
        .await
        .context("Failed to prepare store schema")?;
    if report.is_noop() {
        info!("Store schema up to date");
    } else {
        info!(
            created_tables = ?report.created_tables,
            added_columns = ?report.added_columns,
            normalized_tables = ?report.normalized_tables,
            seeded_cursor = report.seeded_cursor,
            "Store schema updated"
        );
    }

    let connector = DiscordConnector::new(config.discord_config());
    let mut sync = SyncLoop::new(connector, db, config.sync_settings())
        .await
        .context("Failed to initialize sync loop")?;

    if config.fetch_genesis {
        if let Err(e) = sync.capture_genesis().await {
            warn!("Genesis message skipped: {e:#}");
        }
    }

    tokio::select! {
        () = sync.run() => {},
        () = shutdown_signal() => {
            info!("Shutting down...");
        }
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discord_channel_mirror=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
