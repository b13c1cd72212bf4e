mod admission;
mod config;
mod dedup;
mod error;
mod handlers;
mod metrics;
mod pipeline;
mod state;
mod stream;
mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use sentrygrid_crypto::TrustMap;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::BusConfig;
use crate::state::{sink_worker, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "sentrygrid_bus=info,tower_http=info".into()))
        .json()
        .init();

    let config = BusConfig::parse();
    info!(listen = %config.listen_host, port = config.listen_port, "sentrygrid EventBus starting");

    let trust_map = match TrustMap::load_from_file(&config.trust_map_path) {
        Ok(tm) => Arc::new(tm),
        Err(e) => {
            error!(error = %e, path = %config.trust_map_path.display(), "failed to load trust map");
            std::process::exit(1);
        }
    };

    let server_tls = match tls::load_server_config(
        &config.tls_ca_path,
        &config.tls_server_cert_path,
        &config.tls_server_key_path,
    ) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "failed to build TLS server config");
            std::process::exit(1);
        }
    };
    let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(server_tls.clone());

    let (sink_tx, sink_rx) = mpsc::channel(config.sink_buffer);
    let state = AppState::new(&config, trust_map, sink_tx);
    tokio::spawn(sink_worker(sink_rx));

    let stream_addr = SocketAddr::new(config.listen_host.parse().unwrap_or_else(|_| {
        error!(host = %config.listen_host, "invalid listen_host, falling back to 0.0.0.0");
        "0.0.0.0".parse().unwrap()
    }), config.stream_port);
    let stream_state = state.clone();
    let stream_tls = server_tls.clone();
    tokio::spawn(async move {
        if let Err(e) = stream::serve(stream_addr, stream_tls, stream_state).await {
            error!(error = %e, "PublishStream listener exited");
        }
    });

    let health_app = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/ready", get(handlers::ready))
        .with_state(state.clone());
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(health_addr).await.unwrap_or_else(|e| {
            error!(%health_addr, error = %e, "failed to bind health listener");
            std::process::exit(1);
        });
        info!(%health_addr, "health listener bound");
        if let Err(e) = axum::serve(listener, health_app).await {
            error!(error = %e, "health listener exited");
        }
    });

    let metrics_app = Router::new()
        .route("/metrics", get(handlers::metrics))
        .with_state(state.clone());
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(metrics_addr).await.unwrap_or_else(|e| {
            error!(%metrics_addr, error = %e, "failed to bind metrics listener");
            std::process::exit(1);
        });
        info!(%metrics_addr, "metrics listener bound");
        if let Err(e) = axum::serve(listener, metrics_app).await {
            error!(error = %e, "metrics listener exited");
        }
    });

    let app = Router::new()
        .route("/v1/publish", post(handlers::publish))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    info!(%addr, "publish listener bound");
    let acceptor = tls::ClientCertAcceptor::new(rustls_config);
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, draining publish listener");
        shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    axum_server::bind(addr)
        .acceptor(acceptor)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "publish listener exited");
            std::process::exit(1);
        });
}
