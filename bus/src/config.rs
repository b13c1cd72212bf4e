use std::path::PathBuf;

use clap::Parser;

/// EventBus configuration: environment variables first, `clap` flags as overrides.
#[derive(Parser, Debug, Clone)]
#[command(name = "sentrygrid-bus", about = "sentrygrid EventBus ingestion server")]
pub struct BusConfig {
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: String,
    #[arg(long, env = "LISTEN_PORT", default_value_t = 50051)]
    pub listen_port: u16,

    /// Port for the raw length-delimited `PublishStream` listener.
    #[arg(long, env = "STREAM_PORT", default_value_t = 50052)]
    pub stream_port: u16,

    #[arg(long, env = "TLS_CA_PATH")]
    pub tls_ca_path: PathBuf,
    #[arg(long, env = "TLS_SERVER_CERT_PATH")]
    pub tls_server_cert_path: PathBuf,
    #[arg(long, env = "TLS_SERVER_KEY_PATH")]
    pub tls_server_key_path: PathBuf,

    #[arg(long, env = "TRUST_MAP_PATH")]
    pub trust_map_path: PathBuf,

    #[arg(long, env = "MAX_INFLIGHT_SOFT", default_value_t = 100)]
    pub max_inflight_soft: i64,
    #[arg(long, env = "MAX_INFLIGHT_HARD", default_value_t = 500)]
    pub max_inflight_hard: i64,
    #[arg(long, env = "OVERLOAD_HYSTERESIS", default_value_t = 0.8)]
    pub overload_hysteresis: f64,

    #[arg(long, env = "MAX_ENVELOPE_BYTES", default_value_t = 131_072)]
    pub max_envelope_bytes: usize,

    #[arg(long, env = "DEDUP_TTL_SECONDS", default_value_t = 300)]
    pub dedup_ttl_seconds: u64,
    #[arg(long, env = "DEDUP_CAPACITY", default_value_t = 100_000)]
    pub dedup_capacity: usize,

    #[arg(long, env = "METRICS_PORT", default_value_t = 9100)]
    pub metrics_port: u16,
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8080)]
    pub health_port: u16,

    #[arg(long, env = "SINK_BUFFER", default_value_t = 1024)]
    pub sink_buffer: usize,
}
