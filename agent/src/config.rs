use std::path::PathBuf;

use clap::Parser;

/// Agent configuration: environment variables first, `clap` flags as overrides.
#[derive(Parser, Debug, Clone)]
#[command(name = "sentrygrid-agent", about = "sentrygrid telemetry agent")]
pub struct AgentConfig {
    #[arg(long, env = "BUS_ADDRESS")]
    pub bus_address: String,

    #[arg(long, env = "TLS_CA_PATH")]
    pub tls_ca_path: PathBuf,
    #[arg(long, env = "TLS_CLIENT_CERT_PATH")]
    pub tls_client_cert_path: PathBuf,
    #[arg(long, env = "TLS_CLIENT_KEY_PATH")]
    pub tls_client_key_path: PathBuf,

    #[arg(long, env = "SOURCE_IDENTITY")]
    pub source_identity: String,

    #[arg(long, env = "ED25519_PRIVATE_KEY_PATH")]
    pub ed25519_private_key_path: PathBuf,

    #[arg(long, env = "WAL_PATH")]
    pub wal_path: PathBuf,
    #[arg(long, env = "WAL_MAX_BYTES", default_value_t = 200 * 1024 * 1024)]
    pub wal_max_bytes: u64,
    #[arg(long, env = "WAL_MAX_RECORDS", default_value_t = 100_000)]
    pub wal_max_records: usize,
    #[arg(long, env = "WAL_DEDUP_WINDOW_S", default_value_t = 300)]
    pub wal_dedup_window_s: u64,

    /// Events/second, 0 = unlimited.
    #[arg(long, env = "SEND_RATE", default_value_t = 0)]
    pub send_rate: u32,
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, env = "RETRY_BASE_MS", default_value_t = 1000)]
    pub retry_base_ms: u64,
    #[arg(long, env = "RETRY_MAX_MS", default_value_t = 60_000)]
    pub retry_max_ms: u64,
    #[arg(long, env = "RETRY_JITTER", default_value_t = 0.5)]
    pub retry_jitter: f64,
    #[arg(long, env = "RETRY_FLOOR_MS", default_value_t = 100)]
    pub retry_floor_ms: u64,

    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,
    #[arg(long, env = "BREAKER_OPEN_SECONDS", default_value_t = 30)]
    pub breaker_open_seconds: u64,

    #[arg(long, env = "METRICS_PORT", default_value_t = 9101)]
    pub metrics_port: u16,
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8081)]
    pub health_port: u16,

    #[arg(long, env = "SHUTDOWN_GRACE_SECONDS", default_value_t = 10)]
    pub shutdown_grace_seconds: u64,

    /// How often each probe is invoked, absent a per-probe override.
    #[arg(long, env = "COLLECTION_INTERVAL_SECONDS", default_value_t = 30)]
    pub collection_interval_seconds: u64,
}
