//! Best-effort enrichment: hostname, local IP, platform tag. Failures here log and leave
//! the field untouched rather than reject the event — enrichment is never a reason to
//! drop telemetry.

use sentrygrid_wire::Payload;
use tracing::warn;

pub struct EnrichmentContext {
    pub hostname: String,
    pub local_ip: Option<String>,
    pub platform: &'static str,
}

impl EnrichmentContext {
    pub fn discover() -> Self {
        Self {
            hostname: hostname(),
            local_ip: local_ip(),
            platform: std::env::consts::OS,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::fs::read_to_string("/etc/hostname").map(|s| s.trim().to_string()))
        .unwrap_or_else(|_| {
            warn!("unable to determine hostname, using \"unknown\"");
            "unknown".to_string()
        })
}

/// Discovers the local outbound IP by opening a UDP socket toward a public address
/// without sending any traffic (the well-known "connect trick").
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("1.1.1.1:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

/// Fills best-effort, blank fields per payload variant. Never overwrites a value the
/// probe already populated.
pub fn enrich(payload: &mut Payload, ctx: &EnrichmentContext) {
    match payload {
        Payload::Auth(a) => {
            if a.source_ip.is_empty() {
                if let Some(ip) = &ctx.local_ip {
                    a.source_ip = ip.clone();
                }
            }
        }
        Payload::Flow(f) => {
            if f.src_ip.is_empty() {
                if let Some(ip) = &ctx.local_ip {
                    f.src_ip = ip.clone();
                }
            }
        }
        Payload::Dns(d) => {
            if d.client_ip.is_empty() {
                if let Some(ip) = &ctx.local_ip {
                    d.client_ip = ip.clone();
                }
            }
        }
        Payload::Process(p) => {
            if p.user.is_empty() {
                p.user = ctx.hostname.clone();
            }
        }
        Payload::FileChange(_) | Payload::Peripheral(_) => {}
    }
}
