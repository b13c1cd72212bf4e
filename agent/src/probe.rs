//! The probe interface: an external-collaborator boundary. Concrete collectors
//! (process scan, DNS sniffing, USB enumeration, FIM hashing) are out of scope; only the
//! trait they'd implement and two illustrative, non-production probes live here so the
//! scheduler has something real to drive.

use sentrygrid_wire::{FlowRecord, Payload};

/// One observation a probe produced this cycle, paired with a stable idempotency key the
/// probe itself is responsible for keeping consistent across retries of the same logical
/// event.
pub struct Candidate {
    pub idempotency_key: String,
    pub payload: Payload,
}

/// A telemetry source invoked on its own timer by the scheduler.
pub trait Probe: Send + Sync {
    /// Stable name used in `agent_events_collected_total{probe}` and
    /// `agent_events_rejected_total{probe,reason}`.
    fn name(&self) -> &'static str;

    /// Collects candidate events since the last call. Probes are expected to be
    /// best-effort: an internal collection failure should log and return an empty list
    /// rather than propagate, since one bad probe must not stall the others.
    fn collect(&self) -> Vec<Candidate>;
}

/// Synthetic liveness signal: proves the scheduler/WAL/drain path end-to-end without
/// depending on real host telemetry. Not a production collector.
pub struct HeartbeatProbe {
    source_identity: String,
    tick: std::sync::atomic::AtomicU64,
}

impl HeartbeatProbe {
    pub fn new(source_identity: impl Into<String>) -> Self {
        Self {
            source_identity: source_identity.into(),
            tick: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl Probe for HeartbeatProbe {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn collect(&self) -> Vec<Candidate> {
        let n = self.tick.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        vec![Candidate {
            idempotency_key: format!("heartbeat:{}:{}", self.source_identity, n),
            payload: Payload::Auth(sentrygrid_wire::AuthRecord {
                user: "agent".to_string(),
                method: "heartbeat".to_string(),
                success: true,
                source_ip: String::new(),
            }),
        }]
    }
}

/// Synthetic loopback network-flow probe: emits one flow record describing a nonexistent
/// localhost transfer. Demonstrates the flow-record collection path; not a real netflow
/// or pcap collector.
pub struct LoopbackFlowProbe {
    source_identity: String,
    tick: std::sync::atomic::AtomicU64,
}

impl LoopbackFlowProbe {
    pub fn new(source_identity: impl Into<String>) -> Self {
        Self {
            source_identity: source_identity.into(),
            tick: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl Probe for LoopbackFlowProbe {
    fn name(&self) -> &'static str {
        "loopback_flow"
    }

    fn collect(&self) -> Vec<Candidate> {
        let n = self.tick.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        vec![Candidate {
            idempotency_key: format!("loopback_flow:{}:{}", self.source_identity, n),
            payload: Payload::Flow(FlowRecord {
                src_ip: "127.0.0.1".to_string(),
                dst_ip: "127.0.0.1".to_string(),
                src_port: 0,
                dst_port: 0,
                protocol: "tcp".to_string(),
                bytes_sent: 0,
                bytes_recv: 0,
            }),
        }]
    }
}
