//! Deterministic byte serialization of an envelope's signed fields.
//!
//! This is deliberately *not* the prost wire encoding: prost's varint layout is an
//! implementation detail of the `prost` crate version in use, while signatures must
//! interoperate across any implementation that follows this byte layout. The rules are:
//! fixed field order (struct declaration order), big-endian fixed-width integers, and a
//! `u32` big-endian length prefix in front of every variable-length blob.

use crate::envelope::Envelope;
use crate::payload::{
    AuthRecord, DnsRecord, FileChangeRecord, FlowRecord, Payload, PeripheralRecord, ProcessRecord,
};

fn write_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_blob(out, s.as_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_bool(out: &mut Vec<u8>, v: bool) {
    out.push(if v { 1 } else { 0 });
}

/// Canonical bytes for a single payload variant, in struct-declaration field order.
fn canonicalize_payload(p: &Payload) -> Vec<u8> {
    let mut out = Vec::new();
    match p {
        Payload::Flow(FlowRecord {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            bytes_sent,
            bytes_recv,
        }) => {
            write_str(&mut out, src_ip);
            write_str(&mut out, dst_ip);
            write_u32(&mut out, *src_port);
            write_u32(&mut out, *dst_port);
            write_str(&mut out, protocol);
            write_u64(&mut out, *bytes_sent);
            write_u64(&mut out, *bytes_recv);
        }
        Payload::Process(ProcessRecord {
            pid,
            ppid,
            exe_path,
            cmdline,
            sha256,
            user,
        }) => {
            write_u32(&mut out, *pid);
            write_u32(&mut out, *ppid);
            write_str(&mut out, exe_path);
            write_str(&mut out, cmdline);
            write_str(&mut out, sha256);
            write_str(&mut out, user);
        }
        Payload::Auth(AuthRecord {
            user,
            method,
            success,
            source_ip,
        }) => {
            write_str(&mut out, user);
            write_str(&mut out, method);
            write_bool(&mut out, *success);
            write_str(&mut out, source_ip);
        }
        Payload::Dns(DnsRecord {
            query_name,
            query_type,
            resolved_ips,
            client_ip,
        }) => {
            write_str(&mut out, query_name);
            write_str(&mut out, query_type);
            write_u32(&mut out, resolved_ips.len() as u32);
            for ip in resolved_ips {
                write_str(&mut out, ip);
            }
            write_str(&mut out, client_ip);
        }
        Payload::FileChange(FileChangeRecord {
            path,
            sha256_before,
            sha256_after,
            change_kind,
        }) => {
            write_str(&mut out, path);
            write_str(&mut out, sha256_before);
            write_str(&mut out, sha256_after);
            write_str(&mut out, change_kind);
        }
        Payload::Peripheral(PeripheralRecord {
            device_id,
            vendor_id,
            product_id,
            action,
        }) => {
            write_str(&mut out, device_id);
            write_u32(&mut out, *vendor_id);
            write_u32(&mut out, *product_id);
            write_str(&mut out, action);
        }
    }
    out
}

/// Canonical bytes over every signed field of `e` except `signature` itself.
///
/// Pure function of `e`'s field values: independent of map iteration order (there are no
/// maps), locale, or field-setting order.
pub fn canonicalize(e: &Envelope) -> Vec<u8> {
    let mut out = Vec::new();
    write_str(&mut out, &e.version);
    write_u64(&mut out, e.timestamp_ns);
    write_str(&mut out, &e.idempotency_key);
    write_str(&mut out, &e.source_identity);
    match &e.payload {
        Some(p) => {
            out.push(p.canonical_tag());
            write_blob(&mut out, &canonicalize_payload(p));
        }
        None => {
            out.push(0);
            write_blob(&mut out, &[]);
        }
    }
    write_blob(&mut out, &e.prev_signature);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FlowRecord;
    use sha2::{Digest, Sha256};

    fn golden_envelope() -> Envelope {
        Envelope {
            version: "v1".to_string(),
            timestamp_ns: 1_700_000_000_000_000_000,
            idempotency_key: "golden-key-0001".to_string(),
            source_identity: "agent-golden".to_string(),
            payload: Some(Payload::Flow(FlowRecord {
                src_ip: "10.1.2.3".to_string(),
                dst_ip: "10.4.5.6".to_string(),
                src_port: 51234,
                dst_port: 443,
                protocol: "tcp".to_string(),
                bytes_sent: 4096,
                bytes_recv: 8192,
            })),
            signature: vec![0xAB; 64],
            prev_signature: vec![],
        }
    }

    /// Golden test vector: a fixed envelope must canonicalize to these exact bytes and
    /// this exact SHA-256 digest on any implementation — this vector IS the contract
    /// other implementations must match.
    #[test]
    fn golden_vector_matches() {
        let bytes = canonicalize(&golden_envelope());
        let expected_hex = concat!(
            "00000002", "7631",                          // version = "v1"
            "17979cfe362a0000",                           // timestamp_ns (u64 BE)
            "0000000f", "676f6c64656e2d6b65792d30303031", // idempotency_key
            "0000000c", "6167656e742d676f6c64656e",       // source_identity
            "01",                                          // payload tag = Flow
            "00000037",                                   // payload blob length = 55
            "00000008", "31302e312e322e33",               // src_ip
            "00000008", "31302e342e352e36",               // dst_ip
            "0000c822",                                   // src_port = 51234
            "000001bb",                                   // dst_port = 443
            "00000003", "746370",                         // protocol = "tcp"
            "0000000000001000",                           // bytes_sent = 4096
            "0000000000002000",                           // bytes_recv = 8192
            "00000000",                                   // prev_signature (empty)
        );
        assert_eq!(hex::encode(&bytes), expected_hex);

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        assert_eq!(
            hex::encode(digest),
            "47c9cb2239cb8b9987b7a8986236059e86698365dd32a91b2387d68a644bb9e5"
        );
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let e = golden_envelope();
        assert_eq!(canonicalize(&e), canonicalize(&e));
    }

    #[test]
    fn excludes_signature_field() {
        let mut e = golden_envelope();
        let before = canonicalize(&e);
        e.signature = vec![0x00; 64];
        let after = canonicalize(&e);
        assert_eq!(before, after, "signature must not affect canonical bytes");
    }

    #[test]
    fn single_bit_payload_change_changes_bytes() {
        let mut e = golden_envelope();
        let before = canonicalize(&e);
        if let Some(Payload::Flow(f)) = &mut e.payload {
            f.dst_port += 1;
        }
        let after = canonicalize(&e);
        assert_ne!(before, after);
    }
}
