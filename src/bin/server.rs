use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treasure_hunt::server::{self, RouterOptions};
use treasure_hunt::sqlite_store::SqliteQuestStore;
use treasure_hunt::{
    DiskUploadStore, HuntConfig, HuntManager, HuntRules, Journal, SkipRule, TeamRegistry, default_seed,
    load_seed_file, seed_if_empty, sweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treasure_hunt=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = HuntConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        teams = config.teams.len(),
        game_duration_secs = config.game_duration.as_secs(),
        "Loaded hunt configuration"
    );

    // --- Quest store ---
    let store = SqliteQuestStore::open(&config.database_path)
        .with_context(|| format!("Failed to open quest database {}", config.database_path.display()))?;
    let seeds = match &config.seed_file {
        Some(path) => load_seed_file(path).with_context(|| format!("Failed to load seed file {}", path.display()))?,
        None => default_seed(),
    };
    seed_if_empty(&store, seeds).context("Failed to seed quest database")?;

    // --- Journal and uploads ---
    let journal = Journal::open(&config.action_log, &config.results_log).context("Failed to open hunt logs")?;
    let uploads = DiskUploadStore::new(&config.upload_dir, config.max_upload_bytes);
    tracing::info!(dir = %uploads.root().display(), max_bytes = uploads.max_bytes(), "Upload storage ready");

    // --- Hunt manager ---
    let rules = HuntRules {
        game_duration: config.game_duration,
        skip: SkipRule::new(config.skip_answer.as_deref()),
    };
    let manager = HuntManager::new(TeamRegistry::new(config.teams.clone()), Arc::new(store), rules)
        .with_uploads(Arc::new(uploads))
        .with_journal(journal);

    // --- Game-end sweeper ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = sweeper::spawn(manager.clone(), config.sweep_interval, sweep_cancel.clone());

    // --- Router ---
    let app = server::router(manager, RouterOptions {
        session_idle: config.session_idle,
        max_upload_bytes: config.max_upload_bytes,
    });

    // --- Start server ---
    let host = config.host.parse().with_context(|| format!("Invalid HOST address {:?}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, "Treasure hunt server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped accepting connections, cleaning up");
    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
