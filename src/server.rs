//! Process driver: wires the Configuration Store, Template Registry, Model List
//! Manager, Stats Store, OAuth Manager and Router together, starts the
//! background sweepers (config file watcher, token refresh), and exposes a
//! minimal health-check HTTP surface. Per-request protocol translation and
//! the full chat-completions surface are delegated to an external caller of
//! [`ModelRouter::dispatch`]/[`ModelRouter::record_usage`] — this module only
//! owns process lifecycle.

use anyhow::Result;
use axum::{routing::get, Router};
use notify::{RecursiveMode, Watcher};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info, warn};

use crate::{
    config::ProcessConfig,
    config_store::ConfigStore,
    handlers::health::{health_check, readiness_check},
    model_list::ModelListManager,
    oauth::{
        manager::OAuthManager,
        refresh::start_auto_refresh_task,
        session_store::{start_session_sweeper, SessionStore},
        state_store::{start_state_sweeper, StateStore},
        token_store::TokenStore,
    },
    router::ModelRouter,
    signals::{setup_signal_handlers, ShutdownSignal},
    stats::StatsStore,
    templates::TemplateRegistry,
};

/// The set of long-lived components a running gateway process holds. An
/// external caller (an HTTP handler layer, a REPL, a test harness) drives
/// requests through `router`; this struct just keeps everything alive.
pub struct Gateway {
    pub config_store: Arc<ConfigStore>,
    pub templates: Arc<TemplateRegistry>,
    pub model_lists: Arc<ModelListManager>,
    pub stats: Arc<StatsStore>,
    pub token_store: Arc<TokenStore>,
    pub oauth_manager: Arc<OAuthManager>,
    pub router: Arc<ModelRouter>,
}

impl Gateway {
    pub async fn init(process_cfg: &ProcessConfig) -> Result<Self> {
        let config_store = Arc::new(ConfigStore::init(&process_cfg.config_dir).await?);

        let models_dir = process_cfg.config_dir.join("models");
        let model_lists = Arc::new(ModelListManager::init(&models_dir).await?);

        let templates = Arc::new(TemplateRegistry::init(&process_cfg.config_dir, None).await?);

        let state_dir = process_cfg.config_dir.join("state");
        std::fs::create_dir_all(&state_dir)?;

        let stats_pool = connect_stats_db(&state_dir).await?;
        let stats = Arc::new(StatsStore::new(stats_pool).await?);

        let token_store = Arc::new(
            TokenStore::new(state_dir.join("oauth_tokens.json")).await?,
        );
        let state_store = StateStore::new();
        let session_store = SessionStore::new();
        let oauth_manager = Arc::new(OAuthManager::new(
            process_cfg.oauth_providers.clone(),
            token_store.clone(),
            state_store.clone(),
            session_store.clone(),
        ));

        start_auto_refresh_task(token_store.clone(), oauth_manager.clone());
        start_state_sweeper(state_store);
        start_session_sweeper(session_store);

        let router = Arc::new(ModelRouter::new(config_store.clone(), stats.clone()));

        Ok(Self {
            config_store,
            templates,
            model_lists,
            stats,
            token_store,
            oauth_manager,
            router,
        })
    }
}

async fn connect_stats_db(state_dir: &std::path::Path) -> Result<sqlx::SqlitePool> {
    let db_path = state_dir.join("stats.db");
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
    let pool = sqlx::SqlitePool::connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to stats database: {}", e))?;
    Ok(pool)
}

fn health_router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// Watches the config directory for changes to `config.json` and triggers the
/// same reload path a SIGHUP does. The watcher itself only debounces on OS
/// events; [`ConfigStore::reload`] debounces again on mtime, so a flurry of
/// writes collapses to at most one reload.
fn spawn_config_watcher(store: Arc<ConfigStore>, config_dir: std::path::PathBuf) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.blocking_send(event);
        }
    })?;
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        // Keep the watcher alive for the lifetime of the task.
        let _watcher = watcher;
        while let Some(_event) = rx.recv().await {
            match store.reload().await {
                Ok(true) => info!("config directory change detected, reloaded"),
                Ok(false) => {}
                Err(e) => error!("failed to reload configuration after file change: {}", e),
            }
        }
    });

    Ok(())
}

/// Starts the gateway process: initializes every component, wires the config
/// watcher and signal handlers, and serves the health-check surface until a
/// shutdown signal arrives.
pub async fn start_server(process_cfg: ProcessConfig) -> Result<()> {
    crate::init_tracing();
    info!("LLM Gateway starting...");

    let gateway = Gateway::init(&process_cfg).await?;

    if let Err(e) = spawn_config_watcher(gateway.config_store.clone(), process_cfg.config_dir.clone()) {
        warn!("failed to start config file watcher: {}", e);
    }

    let (shutdown_tx, _signal_handle) = setup_signal_handlers(gateway.config_store.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();

    let doc = gateway.config_store.snapshot();
    let port = process_cfg.port.unwrap_or(doc.flags.server_port);
    let addr: SocketAddr = format!("{}:{}", process_cfg.host, port).parse()?;

    let app = health_router();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match shutdown_rx.recv().await {
                Ok(ShutdownSignal::Graceful) => info!("graceful shutdown initiated"),
                Err(_) => warn!("shutdown channel closed unexpectedly"),
            }
        })
        .await?;

    info!("LLM Gateway stopped");
    Ok(())
}

#[allow(dead_code)]
fn default_reload_debounce() -> Duration {
    Duration::from_millis(500)
}
