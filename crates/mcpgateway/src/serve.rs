//! The `serve` and `translate` entry points.

use crate::exit;
use mcpgateway_config::{GatewayConfig, StoreBackend};
use mcpgateway_federation::FederationRuntime;
use mcpgateway_server::{ApplicationBuilder, StdioBridge, http};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the dataplane until SIGINT/SIGTERM. Returns the process exit
/// code.
pub fn run(config: GatewayConfig) -> u8 {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "cannot build runtime");
            return exit::FAILURE;
        }
    };
    runtime.block_on(async { serve(config).await })
}

async fn serve(config: GatewayConfig) -> u8 {
    // only the in-memory engine ships in this build; SQL engines are
    // selected by URL but provided by deployment-specific builds
    match config.store.backend() {
        Ok(StoreBackend::Memory) => {}
        Ok(other) => {
            error!(?other, "store backend not available in this build");
            return exit::STORE;
        }
        Err(error) => {
            error!(%error, "invalid store configuration");
            return exit::CONFIG;
        }
    }

    let app = match ApplicationBuilder::new(config.clone()).with_prometheus().build() {
        Ok(app) => app,
        Err(error) => {
            error!(%error, "cannot build application");
            return exit::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // leader-elected background workers
    let federation_handle = if config.federation.enabled {
        let runtime = FederationRuntime::new(
            app.store().clone(),
            app.pool().clone(),
            config.federation.clone(),
        );
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { runtime.run(rx).await }))
    } else {
        None
    };

    #[cfg(feature = "mdns")]
    let _announcer = if config.federation.mdns_discovery {
        match mcpgateway_federation::MdnsAnnouncer::announce(
            "mcpgateway",
            config.server.port,
            env!("CARGO_PKG_VERSION"),
            None,
        ) {
            Ok(announcer) => Some(announcer),
            Err(error) => {
                error!(%error, "mDNS announce failed");
                None
            }
        }
    } else {
        None
    };

    // idle session sweeper
    {
        let app = app.clone();
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = interval.tick() => app.sweep_idle_sessions().await,
                    _ = rx.changed() => break,
                }
            }
        });
    }

    let router = http::router(app.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%addr, %error, "cannot bind");
            return exit::FAILURE;
        }
    };
    app.set_ready(true);
    info!(%addr, "mcpgateway listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_signal())
        .await;

    // drain: stop workers, release the leader lock
    let _ = shutdown_tx.send(true);
    if let Some(handle) = federation_handle {
        let _ = handle.await;
    }
    app.set_ready(false);

    match served {
        Ok(()) => exit::OK,
        Err(error) => {
            error!(%error, "server error");
            exit::FAILURE
        }
    }
}

/// Run the stdio bridge. Returns the process exit code.
pub fn translate(host: &str, port: u16, command: &[String]) -> u8 {
    let Some((program, args)) = command.split_first() else {
        error!("translate requires a command to spawn");
        return exit::FAILURE;
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "cannot build runtime");
            return exit::FAILURE;
        }
    };
    runtime.block_on(async {
        let bridge = match StdioBridge::spawn(program, args, Duration::from_secs(60)) {
            Ok(bridge) => bridge,
            Err(error) => {
                error!(%error, "cannot spawn stdio server");
                return exit::FAILURE;
            }
        };
        match bridge.serve(host, port).await {
            Ok(()) => exit::OK,
            Err(error) => {
                error!(%error, "bridge failed");
                exit::FAILURE
            }
        }
    })
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining");
}
