mod config;
mod content_filter;
mod dispatcher;
mod error;
mod http;
mod metrics;
mod network;
mod protocol;
mod rate_limit;
mod state;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::network::GatewayState;
use crate::state::Core;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        }
    }
    PathBuf::from("strangerlink.toml")
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    init_tracing(&config);
    config::validate(&config)?;

    metrics::init();

    let core = Arc::new(Core::new(config.clone()));
    let dispatcher = Arc::new(Dispatcher::new(core.clone()));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    spawn_periodic_maintenance(dispatcher.clone(), shutdown_tx.subscribe());

    {
        let core = core.clone();
        let config = config.clone();
        tokio::spawn(async move {
            http::run_admin_server(core, config).await;
        });
    }

    let gateway_state = GatewayState {
        dispatcher: dispatcher.clone(),
        shutdown: shutdown_tx.clone(),
    };
    let app = network::build_router(gateway_state);
    let listener = tokio::net::TcpListener::bind(&config.listen.address).await?;
    info!("websocket gateway listening on {}", config.listen.address);

    spawn_shutdown_signal_handler(shutdown_tx.clone());

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}

fn spawn_shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
            return;
        }
        warn!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });
}

/// Mirrors the teacher's pattern of one `tokio::spawn` per
/// maintenance task, each racing its own ticker against the shared
/// shutdown broadcast.
fn spawn_periodic_maintenance(dispatcher: Arc<Dispatcher>, mut shutdown_rx: broadcast::Receiver<()>) {
    {
        let dispatcher = dispatcher.clone();
        let mut shutdown_rx = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                tokio::select! {
                    _ = interval.tick() => dispatcher.run_match_tick(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    {
        let dispatcher = dispatcher.clone();
        let mut shutdown_rx = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        dispatcher.broadcast_stats();
                        dispatcher.sweep_idle_sessions();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    {
        let dispatcher = dispatcher.clone();
        let mut shutdown_rx = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = interval.tick() => dispatcher.sweep_stale_queue(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
            loop {
                tokio::select! {
                    _ = interval.tick() => dispatcher.sweep_inactive_rooms(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }
}
