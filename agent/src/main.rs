mod backoff;
mod config;
mod drain;
mod enrich;
mod error;
mod metrics;
mod probe;
mod scheduler;
mod transport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use sentrygrid_breaker::CircuitBreaker;
use sentrygrid_crypto::Signer;
use sentrygrid_wal::{Wal, WalConfig};
use tracing::{error, info};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::metrics::Metrics;
use crate::probe::{HeartbeatProbe, LoopbackFlowProbe, Probe};
use crate::transport::BusClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "sentrygrid_agent=info".into()))
        .json()
        .init();

    let config = AgentConfig::parse();
    info!(source_identity = %config.source_identity, bus = %config.bus_address, "sentrygrid agent starting");

    let signer = match load_signer(&config.ed25519_private_key_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to load signing key");
            std::process::exit(1);
        }
    };

    let wal_config = WalConfig {
        max_bytes: config.wal_max_bytes,
        max_records: config.wal_max_records,
        dedup_window: Duration::from_secs(config.wal_dedup_window_s),
        fsync_every_append: true,
    };
    let wal = match Wal::open(&config.wal_path, wal_config) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            error!(error = %e, "failed to open wal");
            std::process::exit(1);
        }
    };

    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        Duration::from_secs(config.breaker_open_seconds),
    ));

    let client = match BusClient::new(
        &config.bus_address,
        &config.tls_ca_path,
        &config.tls_client_cert_path,
        &config.tls_client_key_path,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build bus client");
            std::process::exit(1);
        }
    };

    let metrics = Arc::new(Metrics::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let probes: Vec<Box<dyn Probe>> = vec![
        Box::new(HeartbeatProbe::new(config.source_identity.clone())),
        Box::new(LoopbackFlowProbe::new(config.source_identity.clone())),
    ];

    let scheduler_handle = {
        let wal = wal.clone();
        let metrics = metrics.clone();
        let signer = signer.clone();
        let source_identity = config.source_identity.clone();
        let interval = Duration::from_secs(config.collection_interval_seconds);
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            scheduler::run(probes, signer, wal, metrics, source_identity, interval, shutdown);
        })
    };

    let drain_handle = {
        let wal = wal.clone();
        let breaker = breaker.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        let drain_config = drain::DrainConfig {
            batch_size: config.batch_size,
            send_rate: config.send_rate,
            retry_base_ms: config.retry_base_ms,
            retry_max_ms: config.retry_max_ms,
            retry_jitter: config.retry_jitter,
            retry_floor_ms: config.retry_floor_ms,
        };
        std::thread::spawn(move || {
            drain::run(wal, breaker, client, metrics, drain_config, shutdown);
        })
    };

    let metrics_app = Router::new().route(
        "/metrics",
        get({
            let metrics = metrics.clone();
            let wal = wal.clone();
            move || {
                let metrics = metrics.clone();
                let wal = wal.clone();
                async move {
                    Json(metrics.snapshot(
                        wal.appended_total(),
                        wal.dropped_total(),
                        wal.size_bytes(),
                        wal.pending_count(),
                    ))
                }
            }
        }),
    );
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await.unwrap_or_else(|e| {
        error!(%metrics_addr, error = %e, "failed to bind metrics listener");
        std::process::exit(1);
    });
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            error!(error = %e, "metrics listener exited");
        }
    });

    let health_app = Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/ready", get({
            let breaker = breaker.clone();
            move || {
                let breaker = breaker.clone();
                async move {
                    if breaker.state() == sentrygrid_breaker::BreakerState::Open {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }
        }));
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let health_listener = tokio::net::TcpListener::bind(health_addr).await.unwrap_or_else(|e| {
        error!(%health_addr, error = %e, "failed to bind health listener");
        std::process::exit(1);
    });
    let health_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_app).await {
            error!(error = %e, "health listener exited");
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, draining with bounded grace period");
    shutdown.store(true, Ordering::Relaxed);

    let grace_deadline = Instant::now() + Duration::from_secs(config.shutdown_grace_seconds);
    tokio::task::spawn_blocking(move || {
        while Instant::now() < grace_deadline {
            if scheduler_handle.is_finished() && drain_handle.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    })
    .await
    .ok();

    metrics_server.abort();
    health_server.abort();
    info!("sentrygrid agent stopped");
}

fn load_signer(path: &std::path::Path) -> Result<Signer, AgentError> {
    let hex_str = std::fs::read_to_string(path)?;
    let bytes = hex::decode(hex_str.trim())
        .map_err(|_| AgentError::KeyLoad("private key file is not valid hex".to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AgentError::KeyLoad("ed25519 private key must be 32 bytes".to_string()))?;
    Ok(Signer::from_bytes(&arr))
}
