// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::application::broker::BrokerTransport;
use crate::application::connector::RuntimeConnector;
use crate::application::dashboard_service::DashboardService;
use crate::application::deploy_service::DeployService;
use crate::application::frame_sync::{spawn_vss_sync, FrameBus, VSS_SYNC_INTERVAL};
use crate::application::signal_store::SignalStore;
use crate::domain::dashboard::validate_layout;
use crate::infrastructure::config::{load_connector_config, load_dashboard_config};
use crate::infrastructure::http_prototype_repository::HttpPrototypeRepository;
use crate::infrastructure::selection_store::FileSelectionStore;
use crate::infrastructure::socketio_transport::{SocketIoTransport, TransportSettings};
use crate::presentation::app_state::AppState;
use crate::presentation::frames::frames_socket;
use crate::presentation::streams::{connector_events, logs_stream, runtimes_stream, signals_stream};
use crate::presentation::handlers::{
    deploy, get_connector, get_dashboard, get_logs, get_signals, get_wizard_target, health_check,
    install_lib,
    list_libs, list_runtimes, load_mock_signals, run_app, select_runtime, set_mock_signals,
    set_subscriptions, stop_app, write_signals,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_connector_config()?;
    config.validate()?;
    let dashboard_config = load_dashboard_config()?;
    validate_layout(&dashboard_config.widgets).context("Invalid dashboard layout")?;

    // Shared broker connection (infrastructure layer)
    let broker_url = Url::parse(&config.broker.url)
        .with_context(|| format!("Invalid broker url {}", config.broker.url))?;
    let transport: Arc<dyn BrokerTransport> = Arc::new(SocketIoTransport::connect(
        TransportSettings {
            url: broker_url,
            reconnect_initial: config.reconnect_initial(),
            reconnect_max: config.reconnect_max(),
        },
    )?);
    let selections = Arc::new(FileSelectionStore::open(&config.storage.selection_file));

    // Start connectors (application layer)
    let store = SignalStore::new();
    let frames = FrameBus::new();
    let mut connectors = Vec::new();
    for entry in &config.connectors {
        let frames = entry.primary.then(|| frames.clone());
        let handle = RuntimeConnector::start(
            entry.to_settings(&config.identity),
            transport.clone(),
            &store,
            selections.clone(),
            frames,
        )?;
        connectors.push(handle);
    }
    let primary = config
        .connectors
        .iter()
        .find(|c| c.primary)
        .map(|c| c.name.clone());

    let vss_sync = spawn_vss_sync(store.clone(), frames.clone(), VSS_SYNC_INTERVAL);

    let deploy_service = config.api.as_ref().map(|api| {
        let repository = Arc::new(HttpPrototypeRepository::new(
            api.base_url.clone(),
            api.token.clone(),
        ));
        DeployService::new(repository, config.identity.username.clone())
            .with_timeout(api.deploy_timeout())
    });

    // Create application state
    let (stop_tx, stop_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        connectors: connectors.clone(),
        primary,
        store,
        dashboard_service: DashboardService::new(dashboard_config.widgets),
        deploy_service,
        frames,
        shutdown: stop_rx,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/runtimes", get(list_runtimes))
        .route("/runtimes/stream", get(runtimes_stream))
        .route("/signals", get(get_signals))
        .route("/signals/stream", get(signals_stream))
        .route("/logs", get(get_logs))
        .route("/logs/stream", get(logs_stream))
        .route("/wizard/active", get(get_wizard_target))
        .route("/dashboard", get(get_dashboard))
        .route("/frames", get(frames_socket))
        .route("/connectors/:name", get(get_connector))
        .route("/connectors/:name/events", get(connector_events))
        .route("/connectors/:name/active", put(select_runtime))
        .route("/connectors/:name/subscriptions", put(set_subscriptions))
        .route("/connectors/:name/run", post(run_app))
        .route("/connectors/:name/stop", post(stop_app))
        .route("/connectors/:name/deploy", post(deploy))
        .route("/connectors/:name/mock-signals", post(set_mock_signals))
        .route("/connectors/:name/mock-signals/load", post(load_mock_signals))
        .route("/connectors/:name/signals", post(write_signals))
        .route("/connectors/:name/libs", post(install_lib))
        .route("/connectors/:name/libs/list", post(list_libs))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server.addr))?;
    tracing::info!("Starting runtime-connector on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends event streams and frame sockets so the server can drain
            let _ = stop_tx.send(true);
        })
        .await?;

    // Connectors unsubscribe and unregister before the shared socket closes
    vss_sync.abort();
    for connector in &connectors {
        if let Err(e) = connector.shutdown().await {
            tracing::warn!("Connector {} did not stop cleanly: {}", connector.name(), e);
        }
    }
    transport.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
