//! The closed set of telemetry payload variants an [`Envelope`](crate::envelope::Envelope)
//! may carry. Concrete collectors (process scan, DNS sniffing, FIM hashing, ...) are out of
//! scope here — these are the schemas the core validates and transports, nothing more.

use crate::error::WireError;

/// A network flow observation.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FlowRecord {
    #[prost(string, tag = "1")]
    pub src_ip: String,
    #[prost(string, tag = "2")]
    pub dst_ip: String,
    #[prost(uint32, tag = "3")]
    pub src_port: u32,
    #[prost(uint32, tag = "4")]
    pub dst_port: u32,
    #[prost(string, tag = "5")]
    pub protocol: String,
    #[prost(uint64, tag = "6")]
    pub bytes_sent: u64,
    #[prost(uint64, tag = "7")]
    pub bytes_recv: u64,
}

/// A process-execution observation.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProcessRecord {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub ppid: u32,
    #[prost(string, tag = "3")]
    pub exe_path: String,
    #[prost(string, tag = "4")]
    pub cmdline: String,
    #[prost(string, tag = "5")]
    pub sha256: String,
    #[prost(string, tag = "6")]
    pub user: String,
}

/// An authentication attempt.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AuthRecord {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(bool, tag = "3")]
    pub success: bool,
    #[prost(string, tag = "4")]
    pub source_ip: String,
}

/// A DNS query/response pair.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DnsRecord {
    #[prost(string, tag = "1")]
    pub query_name: String,
    #[prost(string, tag = "2")]
    pub query_type: String,
    #[prost(string, repeated, tag = "3")]
    pub resolved_ips: Vec<String>,
    #[prost(string, tag = "4")]
    pub client_ip: String,
}

/// A file-integrity change.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FileChangeRecord {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub sha256_before: String,
    #[prost(string, tag = "3")]
    pub sha256_after: String,
    #[prost(string, tag = "4")]
    pub change_kind: String,
}

/// A USB/peripheral attach or detach.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PeripheralRecord {
    #[prost(string, tag = "1")]
    pub device_id: String,
    #[prost(uint32, tag = "2")]
    pub vendor_id: u32,
    #[prost(uint32, tag = "3")]
    pub product_id: u32,
    #[prost(string, tag = "4")]
    pub action: String,
}

/// The closed set of payload variants an envelope may carry, modeled as a tagged union
/// rather than a duck-typed record.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "5")]
    Flow(FlowRecord),
    #[prost(message, tag = "6")]
    Process(ProcessRecord),
    #[prost(message, tag = "7")]
    Auth(AuthRecord),
    #[prost(message, tag = "8")]
    Dns(DnsRecord),
    #[prost(message, tag = "9")]
    FileChange(FileChangeRecord),
    #[prost(message, tag = "10")]
    Peripheral(PeripheralRecord),
}

impl Payload {
    /// The stable one-byte tag used in canonical byte serialization (independent of the
    /// prost field tag, so the canonical layout survives a future renumbering of the
    /// wire schema).
    pub fn canonical_tag(&self) -> u8 {
        match self {
            Payload::Flow(_) => 1,
            Payload::Process(_) => 2,
            Payload::Auth(_) => 3,
            Payload::Dns(_) => 4,
            Payload::FileChange(_) => 5,
            Payload::Peripheral(_) => 6,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Flow(_) => "flow",
            Payload::Process(_) => "process",
            Payload::Auth(_) => "auth",
            Payload::Dns(_) => "dns",
            Payload::FileChange(_) => "file_change",
            Payload::Peripheral(_) => "peripheral",
        }
    }

    /// Per-variant closed-set validation applied before an envelope is accepted.
    pub fn validate(&self) -> Result<(), WireError> {
        match self {
            Payload::Flow(f) => {
                require_non_empty("src_ip", &f.src_ip)?;
                require_non_empty("dst_ip", &f.dst_ip)?;
                require_ip(&f.src_ip)?;
                require_ip(&f.dst_ip)?;
                require_port(f.src_port)?;
                require_port(f.dst_port)?;
                require_non_empty("protocol", &f.protocol)?;
                Ok(())
            }
            Payload::Process(p) => {
                require_non_empty("exe_path", &p.exe_path)?;
                if !p.sha256.is_empty() {
                    require_sha256(&p.sha256)?;
                }
                Ok(())
            }
            Payload::Auth(a) => {
                require_non_empty("user", &a.user)?;
                require_non_empty("method", &a.method)?;
                if !a.source_ip.is_empty() {
                    require_ip(&a.source_ip)?;
                }
                Ok(())
            }
            Payload::Dns(d) => {
                require_non_empty("query_name", &d.query_name)?;
                require_domain(&d.query_name)?;
                for ip in &d.resolved_ips {
                    require_ip(ip)?;
                }
                Ok(())
            }
            Payload::FileChange(f) => {
                require_non_empty("path", &f.path)?;
                require_non_empty("change_kind", &f.change_kind)?;
                if !f.sha256_after.is_empty() {
                    require_sha256(&f.sha256_after)?;
                }
                Ok(())
            }
            Payload::Peripheral(p) => {
                require_non_empty("device_id", &p.device_id)?;
                require_non_empty("action", &p.action)?;
                Ok(())
            }
        }
    }
}

fn require_non_empty(field: &'static str, v: &str) -> Result<(), WireError> {
    if v.is_empty() {
        Err(WireError::InvalidField(field))
    } else {
        Ok(())
    }
}

fn require_port(p: u32) -> Result<(), WireError> {
    if p > 65535 {
        Err(WireError::InvalidField("port"))
    } else {
        Ok(())
    }
}

fn require_sha256(s: &str) -> Result<(), WireError> {
    if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(WireError::InvalidField("sha256"))
    }
}

fn require_domain(s: &str) -> Result<(), WireError> {
    if s.len() > 253 || s.is_empty() {
        return Err(WireError::InvalidField("domain"));
    }
    let well_formed = s
        .split('.')
        .all(|label| !label.is_empty() && label.len() <= 63);
    if well_formed {
        Ok(())
    } else {
        Err(WireError::InvalidField("domain"))
    }
}

fn require_ip(s: &str) -> Result<(), WireError> {
    if s.parse::<std::net::IpAddr>().is_ok() {
        Ok(())
    } else {
        Err(WireError::InvalidField("ip"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_record_requires_valid_ips_and_ports() {
        let mut f = FlowRecord {
            src_ip: "10.0.0.1".into(),
            dst_ip: "10.0.0.2".into(),
            src_port: 443,
            dst_port: 80,
            protocol: "tcp".into(),
            bytes_sent: 100,
            bytes_recv: 200,
        };
        assert!(Payload::Flow(f.clone()).validate().is_ok());
        f.src_port = 70000;
        assert!(Payload::Flow(f).validate().is_err());
    }

    #[test]
    fn dns_record_rejects_bad_domain_and_ip() {
        let good = DnsRecord {
            query_name: "example.com".into(),
            query_type: "A".into(),
            resolved_ips: vec!["1.1.1.1".into()],
            client_ip: "10.0.0.1".into(),
        };
        assert!(Payload::Dns(good).validate().is_ok());

        let bad_ip = DnsRecord {
            query_name: "example.com".into(),
            query_type: "A".into(),
            resolved_ips: vec!["not-an-ip".into()],
            client_ip: "10.0.0.1".into(),
        };
        assert!(Payload::Dns(bad_ip).validate().is_err());
    }

    #[test]
    fn process_record_validates_sha256_length() {
        let mut p = ProcessRecord {
            pid: 1,
            ppid: 0,
            exe_path: "/usr/bin/sh".into(),
            cmdline: String::new(),
            sha256: "a".repeat(64),
            user: "root".into(),
        };
        assert!(Payload::Process(p.clone()).validate().is_ok());
        p.sha256 = "short".into();
        assert!(Payload::Process(p).validate().is_err());
    }
}
