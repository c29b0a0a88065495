//! Stormhaven Game Server
//!
//! WebSocket transport server for browser-based game clients. Accepts raw
//! socket connections, upgrades them to WebSocket, decodes inbound frames,
//! and flushes per-client outbound packet queues on a fixed interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use stormhaven_server::config::ServerConfig;
use stormhaven_server::net::handler::{ConnectionHandler, InboundMessage, InboundPayload};
use stormhaven_server::net::queue::OutboundScheduler;
use stormhaven_server::state::AppState;
use stormhaven_server::VERSION;

/// Interval between idle-connection sweeps
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the inbound dispatch channel
const DISPATCH_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Stormhaven Game Server v{}", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    if config.offline_mode {
        warn!("Offline mode enabled - scheduler will drain queues without transmitting");
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone()));
    info!("Application state initialized");

    // Inbound dispatch channel (packet handlers consume decoded payloads)
    let (dispatch_tx, dispatch_rx) = mpsc::channel::<InboundMessage>(DISPATCH_CHANNEL_CAPACITY);
    tokio::spawn(run_dispatch(dispatch_rx));

    // Start the outbound flush scheduler
    let scheduler_state = state.clone();
    let mut scheduler_shutdown_rx = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move {
        run_scheduler(scheduler_state, &mut scheduler_shutdown_rx).await;
    });

    // Start the idle connection sweeper
    let sweep_state = state.clone();
    let mut sweep_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        run_idle_sweep(sweep_state, &mut sweep_shutdown_rx).await;
    });

    // Start WebSocket listener for browser clients
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.websocket_port).parse()?;
    let ws_listener = TcpListener::bind(ws_addr).await?;
    info!("WebSocket server listening on: {}", ws_addr);

    // Spawn connection acceptor
    let ws_state = state.clone();
    let mut ws_shutdown_rx = shutdown_tx.subscribe();
    let ws_handle = tokio::spawn(async move {
        accept_connections(ws_listener, ws_state, dispatch_tx, &mut ws_shutdown_rx).await;
    });

    info!("Server startup complete!");

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Wait for handlers to finish
    let _ = ws_handle.await;
    let _ = scheduler_handle.await;

    // Cleanup
    state.registry.close_all();
    info!("All connections closed");

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stormhaven_server=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Accept incoming WebSocket connections
async fn accept_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    dispatch_tx: mpsc::Sender<InboundMessage>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone(), dispatch_tx.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle(stream, addr).await {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Drive the outbound scheduler on the host update cadence.
///
/// Ticks run finer than the flush interval so flush timing stays within one
/// tick of the configured boundary.
async fn run_scheduler(state: Arc<AppState>, shutdown_rx: &mut broadcast::Receiver<()>) {
    let flush_interval = Duration::from_millis(state.config.flush_interval_ms);
    let transmit = !state.config.offline_mode;

    let mut scheduler = OutboundScheduler::new(state.registry.clone(), flush_interval);

    let cadence = (flush_interval / 4).max(Duration::from_millis(10));
    let mut ticker = interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        flush_interval_ms = state.config.flush_interval_ms,
        transmit,
        "Outbound scheduler started"
    );

    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                scheduler.tick(now - last, transmit);
                last = now;
            }
            _ = shutdown_rx.recv() => {
                info!("Outbound scheduler shutting down");
                break;
            }
        }
    }
}

/// Periodically drop connections that have gone idle
async fn run_idle_sweep(state: Arc<AppState>, shutdown_rx: &mut broadcast::Receiver<()>) {
    let mut ticker = interval(IDLE_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = state.registry.sweep_idle();
                if !removed.is_empty() {
                    info!(count = removed.len(), "Removed idle connections");
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

/// Consume decoded payloads at the packet dispatch boundary.
///
/// Game-logic packet handlers plug in here; the transport core only logs
/// what arrived.
async fn run_dispatch(mut dispatch_rx: mpsc::Receiver<InboundMessage>) {
    while let Some(message) = dispatch_rx.recv().await {
        match &message.payload {
            InboundPayload::Text(text) => {
                debug!(client_id = message.client_id, message = %text, "Inbound text payload");
            }
            InboundPayload::Binary(data) => {
                debug!(
                    client_id = message.client_id,
                    len = data.len(),
                    "Inbound binary payload"
                );
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
