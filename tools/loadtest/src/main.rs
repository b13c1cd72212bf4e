//! Load test tool for the bus: generates signed, varied telemetry envelopes and sends
//! them to `/v1/publish` at a configurable rate, the same way the agent's drain loop
//! would, but open-loop (no WAL, no backoff) so it stresses the bus's own admission path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::Rng;
use sentrygrid_crypto::Signer;
use sentrygrid_wire::{Ack, AckStatus, AuthRecord, Envelope, FlowRecord, Payload, CURRENT_VERSION};

#[derive(Parser)]
#[command(name = "sentrygrid-loadtest", about = "Load test tool for the sentrygrid bus")]
struct Args {
    /// Bus host:port, e.g. bus.internal:8443
    #[arg(long)]
    bus_address: String,

    #[arg(long)]
    tls_ca_path: std::path::PathBuf,
    #[arg(long)]
    tls_client_cert_path: std::path::PathBuf,
    #[arg(long)]
    tls_client_key_path: std::path::PathBuf,

    /// Envelopes per second
    #[arg(long, default_value_t = 100)]
    rate: u32,

    /// Duration in seconds
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Number of distinct source identities / Ed25519 keypairs to round-robin across.
    /// Each must already be present in the bus's trust map under a matching
    /// `source-N` identity for signatures to verify.
    #[arg(long, default_value_t = 1)]
    sources: usize,

    #[arg(long, default_value = "loadtest-source")]
    source_prefix: String,
}

struct Counters {
    sent: AtomicU64,
    ok: AtomicU64,
    retry: AtomicU64,
    invalid: AtomicU64,
    unauthorized: AtomicU64,
    network_error: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            ok: AtomicU64::new(0),
            retry: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
            unauthorized: AtomicU64::new(0),
            network_error: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn build_signed_envelope(signer: &Signer, source_identity: &str, rng: &mut impl Rng, tick: u64) -> Vec<u8> {
    let payload = if tick % 4 == 0 {
        Payload::Auth(AuthRecord {
            user: format!("user{}", rng.gen_range(0..1000)),
            method: "password".to_string(),
            success: rng.gen_bool(0.9),
            source_ip: format!("10.0.{}.{}", rng.gen_range(0..255), rng.gen_range(1..255)),
        })
    } else {
        Payload::Flow(FlowRecord {
            src_ip: format!("10.0.{}.{}", rng.gen_range(0..255), rng.gen_range(1..255)),
            dst_ip: format!("203.0.113.{}", rng.gen_range(1..255)),
            src_port: rng.gen_range(1024..65535),
            dst_port: 443,
            protocol: "tcp".to_string(),
            bytes_sent: rng.gen_range(100..100_000),
            bytes_recv: rng.gen_range(100..100_000),
        })
    };

    let mut idempotency_key = vec![0u8; 8];
    rng.fill(&mut idempotency_key[..]);
    let envelope = Envelope {
        version: CURRENT_VERSION.to_string(),
        timestamp_ns: now_ns(),
        idempotency_key: format!("loadtest:{source_identity}:{}:{}", tick, hex::encode(idempotency_key)),
        source_identity: source_identity.to_string(),
        payload: Some(payload),
        signature: Vec::new(),
        prev_signature: Vec::new(),
    };
    let envelope = signer.sign_envelope(envelope);
    envelope.to_bytes().expect("envelope always within size bound")
}

fn main() {
    let args = Args::parse();

    println!("=== sentrygrid Load Test ===");
    println!("Target:   https://{}/v1/publish", args.bus_address);
    println!("Rate:     {} env/s", args.rate);
    println!("Duration: {}s", args.duration);
    println!("Sources:  {}", args.sources);
    println!();

    let ca_pem = std::fs::read(&args.tls_ca_path).expect("read CA cert");
    let cert_pem = std::fs::read(&args.tls_client_cert_path).expect("read client cert");
    let key_pem = std::fs::read(&args.tls_client_key_path).expect("read client key");
    let mut identity_pem = cert_pem;
    identity_pem.extend_from_slice(&key_pem);
    let identity = reqwest::Identity::from_pem(&identity_pem).expect("valid client identity PEM");
    let ca_cert = reqwest::Certificate::from_pem(&ca_pem).expect("valid CA cert PEM");

    let client = reqwest::blocking::Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .add_root_certificate(ca_cert)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("build mTLS client");

    let health_url = format!("https://{}/ready", args.bus_address);
    match client.get(&health_url).send() {
        Ok(r) if r.status().is_success() => println!("Bus health: OK"),
        Ok(r) => {
            eprintln!("Bus readiness check failed: {}", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Cannot reach bus: {}", e);
            std::process::exit(1);
        }
    }

    let signers: Vec<(String, Signer)> = (0..args.sources)
        .map(|i| {
            let sk = SigningKey::generate(&mut OsRng);
            let source_identity = format!("{}-{}", args.source_prefix, i);
            (source_identity, Signer::new(sk))
        })
        .collect();
    println!("Generated {} signing identity/keypair pairs", signers.len());
    println!("(each source_identity must be present in the bus's trust map for signatures to verify)\n");

    let counters = Arc::new(Counters::new());
    let publish_url = format!("https://{}/v1/publish", args.bus_address);

    let interval = Duration::from_micros(1_000_000 / args.rate.max(1) as u64);
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    println!("Sending...\n");
    let start = Instant::now();
    let mut rng = rand::thread_rng();
    let mut tick = 0u64;

    while Instant::now() < deadline {
        let (source_identity, signer) = &signers[(tick as usize) % signers.len()];
        let body = build_signed_envelope(signer, source_identity, &mut rng, tick);

        let req_start = Instant::now();
        counters.sent.fetch_add(1, Ordering::Relaxed);

        match client.post(&publish_url).body(body).send() {
            Ok(resp) => {
                let latency = req_start.elapsed().as_micros() as u64;
                counters.latency_sum_us.fetch_add(latency, Ordering::Relaxed);

                match resp.bytes() {
                    Ok(bytes) => match Ack::from_bytes(&bytes) {
                        Ok(ack) => match ack.status() {
                            AckStatus::Ok => {
                                counters.ok.fetch_add(1, Ordering::Relaxed);
                            }
                            AckStatus::Retry => {
                                counters.retry.fetch_add(1, Ordering::Relaxed);
                            }
                            AckStatus::Invalid => {
                                counters.invalid.fetch_add(1, Ordering::Relaxed);
                            }
                            AckStatus::Unauthorized => {
                                counters.unauthorized.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        Err(_) => {
                            counters.network_error.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    Err(_) => {
                        counters.network_error.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Err(_) => {
                counters.network_error.fetch_add(1, Ordering::Relaxed);
            }
        }

        tick += 1;

        if tick % 500 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let sent = counters.sent.load(Ordering::Relaxed);
            println!(
                "  [{:.1}s] sent={} ok={} retry={} invalid={} unauthorized={} err={} ({:.0} env/s)",
                elapsed,
                sent,
                counters.ok.load(Ordering::Relaxed),
                counters.retry.load(Ordering::Relaxed),
                counters.invalid.load(Ordering::Relaxed),
                counters.unauthorized.load(Ordering::Relaxed),
                counters.network_error.load(Ordering::Relaxed),
                sent as f64 / elapsed,
            );
        }

        let target = Duration::from_micros(tick * interval.as_micros() as u64);
        let actual = start.elapsed();
        if actual < target {
            std::thread::sleep(target - actual);
        }
    }

    let elapsed = start.elapsed();
    let sent = counters.sent.load(Ordering::Relaxed);
    let ok = counters.ok.load(Ordering::Relaxed);
    let avg_lat = if sent > 0 {
        counters.latency_sum_us.load(Ordering::Relaxed) / sent
    } else {
        0
    };

    println!("\n=== Results ===");
    println!("Duration:     {:.2}s", elapsed.as_secs_f64());
    println!("Total sent:   {sent}");
    println!("Ok:           {} ({:.1}%)", ok, ok as f64 / sent.max(1) as f64 * 100.0);
    println!("Retry:        {}", counters.retry.load(Ordering::Relaxed));
    println!("Invalid:      {}", counters.invalid.load(Ordering::Relaxed));
    println!("Unauthorized: {}", counters.unauthorized.load(Ordering::Relaxed));
    println!("Net errors:   {}", counters.network_error.load(Ordering::Relaxed));
    println!("Avg latency:  {avg_lat} us");
    println!("Throughput:   {:.1} env/s", sent as f64 / elapsed.as_secs_f64());
}
