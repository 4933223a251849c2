use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubeline_core::{load_config, validate_config, DownloadDispatcher, JobHistory, SqliteJobHistory};
use tubeline_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("tubeline {}", VERSION);

    let config_path = std::env::var("TUBELINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Download directory: {:?}", config.downloads.dir);
    info!(
        "Primary: {:?}, secondary: {}",
        config.providers.primary.binary,
        match &config.providers.secondary {
            Some(s) if s.enabled => s.url.as_str(),
            _ => "disabled",
        }
    );

    std::fs::create_dir_all(&config.downloads.dir).with_context(|| {
        format!(
            "Failed to create download directory {:?}",
            config.downloads.dir
        )
    })?;

    let mut dispatcher =
        DownloadDispatcher::from_config(&config).context("Failed to create providers")?;

    if config.history.enabled {
        let history: Arc<dyn JobHistory> = Arc::new(
            SqliteJobHistory::new(&config.history.path)
                .context("Failed to open job history database")?,
        );
        info!("Job history at {:?}", config.history.path);
        dispatcher = dispatcher.with_history(history);
    }

    let dispatcher = Arc::new(dispatcher);

    // Drop finished jobs from memory after the retention window
    let sweeper = (config.jobs.retention_secs > 0).then(|| {
        let retention = Duration::from_secs(config.jobs.retention_secs);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(retention.min(Duration::from_secs(60)));
            loop {
                interval.tick().await;
                dispatcher.purge_finished(retention);
            }
        })
    });

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&dispatcher)));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(handle) = sweeper {
        handle.abort();
    }
    dispatcher.shutdown();
    info!("Dispatcher stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
