//! Handshake sniffing and decoding.
//!
//! The first binary message on a socket either is a VLESS-style or
//! Trojan-style proxy handshake, or it is noise. [`sniff`] tries both
//! decoders in order and collapses every failure into the single opaque
//! [`Error::BadHandshake`]; callers (and remote peers) never learn which
//! decoder failed or why.
//!
//! Both decoders are pure: raw bytes plus the two configured secrets in,
//! a [`ConnectionIntent`] out. No I/O, no state, no streaming — the full
//! handshake must be present in the first message.

mod trojan;
mod vless;

use bytes::Bytes;
use sha2::{Digest, Sha224};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which of the two wire protocols a handshake decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// VLESS-style: UUID auth, addon section, 2-byte server acknowledgement.
    Vless,
    /// Trojan-style: SHA-224 passphrase digest, CRLF framing, no reply.
    Trojan,
}

/// The decoded, validated result of a handshake.
///
/// Created at most once per socket and handed to the relay; never
/// mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIntent {
    /// Target host: dotted-decimal IPv4, domain name, or colon-joined IPv6.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Handshake bytes past the header, to be forwarded upstream before
    /// any further client frames.
    pub payload: Bytes,
    /// Which protocol the handshake decoded as.
    pub kind: ProtocolKind,
}

/// The two read-only secrets the sniffer validates against.
///
/// The Trojan digest is precomputed once so per-connection validation is
/// a plain byte compare.
#[derive(Debug, Clone)]
pub struct HandshakeSecrets {
    /// 16-byte client identifier for VLESS-style handshakes.
    pub user_id: Uuid,
    /// Lowercase hex SHA-224 digest of the passphrase (56 chars).
    trojan_digest: String,
}

impl HandshakeSecrets {
    /// Build secrets from the configured identifier and passphrase.
    pub fn new(user_id: Uuid, passphrase: &str) -> Self {
        let digest = Sha224::digest(passphrase.as_bytes());
        Self {
            user_id,
            trojan_digest: hex::encode(digest),
        }
    }

    /// The expected digest field of a Trojan-style handshake.
    pub(crate) fn trojan_digest(&self) -> &[u8] {
        self.trojan_digest.as_bytes()
    }
}

/// Why a single decoder rejected a buffer.
///
/// Crate-internal by design: the public surface aggregates all of these
/// into [`Error::BadHandshake`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakeFailure {
    /// Identifier or passphrase digest did not match.
    #[error("authentication failed")]
    AuthFailed,
    /// A structural marker (CRLF) was missing or wrong.
    #[error("malformed framing")]
    MalformedFraming,
    /// Command byte requested something other than TCP connect.
    #[error("unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),
    /// Address type byte outside the protocol's code space.
    #[error("unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),
    /// Buffer ended before a declared field did.
    #[error("truncated packet")]
    TruncatedPacket,
}

/// Address field layout shared by both protocols.
///
/// The numeric type codes differ between VLESS (1/2/3) and Trojan (1/3/4);
/// each decoder maps its own code space onto this enum. The divergence is
/// protocol-correct and intentionally not unified.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AddressField {
    /// 4 raw bytes, rendered dotted-decimal.
    Ipv4,
    /// 1-byte length prefix + UTF-8 bytes.
    Domain,
    /// 16 raw bytes, rendered as 8 colon-joined 4-hex-digit groups.
    Ipv6,
}

/// Read an address field at `offset`, returning the rendered host and the
/// offset just past the field.
pub(crate) fn read_address(
    data: &[u8],
    offset: usize,
    field: AddressField,
) -> std::result::Result<(String, usize), HandshakeFailure> {
    match field {
        AddressField::Ipv4 => {
            let raw = data
                .get(offset..offset + 4)
                .ok_or(HandshakeFailure::TruncatedPacket)?;
            let host = format!("{}.{}.{}.{}", raw[0], raw[1], raw[2], raw[3]);
            Ok((host, offset + 4))
        }
        AddressField::Domain => {
            let len = *data.get(offset).ok_or(HandshakeFailure::TruncatedPacket)? as usize;
            let raw = data
                .get(offset + 1..offset + 1 + len)
                .ok_or(HandshakeFailure::TruncatedPacket)?;
            let host = std::str::from_utf8(raw)
                .map_err(|_| HandshakeFailure::MalformedFraming)?
                .to_string();
            Ok((host, offset + 1 + len))
        }
        AddressField::Ipv6 => {
            let raw = data
                .get(offset..offset + 16)
                .ok_or(HandshakeFailure::TruncatedPacket)?;
            let groups: Vec<String> = raw
                .chunks_exact(2)
                .map(|pair| format!("{:04x}", u16::from_be_bytes([pair[0], pair[1]])))
                .collect();
            Ok((groups.join(":"), offset + 16))
        }
    }
}

/// Decode the first binary message of a connection.
///
/// Tries VLESS-style first, then Trojan-style. Any structural or
/// authentication failure in both yields the aggregated
/// [`Error::BadHandshake`].
pub fn sniff(data: &[u8], secrets: &HandshakeSecrets) -> Result<ConnectionIntent> {
    match vless::decode(data, secrets) {
        Ok(intent) => return Ok(intent),
        Err(reason) => tracing::trace!(%reason, "not a VLESS handshake"),
    }

    match trojan::decode(data, secrets) {
        Ok(intent) => return Ok(intent),
        Err(reason) => tracing::trace!(%reason, "not a Trojan handshake"),
    }

    Err(Error::BadHandshake)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const TEST_UUID: &str = "9c4a8620-23a1-4f8e-b3d1-0a5c7e2f9b41";
    pub const TEST_PASSPHRASE: &str = "orange-turbine-88";

    pub fn secrets() -> HandshakeSecrets {
        HandshakeSecrets::new(TEST_UUID.parse().unwrap(), TEST_PASSPHRASE)
    }

    /// Build a VLESS handshake buffer for tests.
    pub fn vless_packet(id: Uuid, addr: &[u8], port: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x00]; // version
        buf.extend_from_slice(id.as_bytes());
        buf.push(0x00); // addon length
        buf.push(0x01); // TCP command
        buf.extend_from_slice(&port.to_be_bytes());
        buf.extend_from_slice(addr); // caller includes the type byte
        buf.extend_from_slice(payload);
        buf
    }

    /// Build a Trojan handshake buffer for tests.
    pub fn trojan_packet(digest: &[u8], addr: &[u8], port: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = digest.to_vec();
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(addr); // caller includes the type byte
        buf.extend_from_slice(&port.to_be_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(payload);
        buf
    }

    pub fn trojan_digest() -> Vec<u8> {
        use sha2::{Digest, Sha224};
        hex::encode(Sha224::digest(TEST_PASSPHRASE.as_bytes())).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_sniff_garbage_is_bad_handshake() {
        let secrets = secrets();
        for buf in [
            &b""[..],
            &b"\x00"[..],
            &b"GET / HTTP/1.1\r\n\r\n"[..],
            &[0xffu8; 200][..],
        ] {
            assert!(matches!(sniff(buf, &secrets), Err(Error::BadHandshake)));
        }
    }

    #[test]
    fn test_sniff_prefers_vless() {
        let secrets = secrets();
        let buf = vless_packet(
            TEST_UUID.parse().unwrap(),
            &[0x01, 10, 0, 0, 1],
            8080,
            b"hello",
        );
        let intent = sniff(&buf, &secrets).unwrap();
        assert_eq!(intent.kind, ProtocolKind::Vless);
    }

    #[test]
    fn test_sniff_falls_back_to_trojan() {
        let secrets = secrets();
        let buf = trojan_packet(&trojan_digest(), &[0x01, 10, 0, 0, 1], 8080, b"hi");
        let intent = sniff(&buf, &secrets).unwrap();
        assert_eq!(intent.kind, ProtocolKind::Trojan);
    }

    #[test]
    fn test_https_ipv4_handshake_layout() {
        // [0x00][16-byte id][addonsLen=0][cmd=1][port=0x01BB][addrType=1]
        // [4 IPv4 bytes][payload] → port 443, dotted IPv4, trailing payload.
        let secrets = secrets();
        let id: Uuid = TEST_UUID.parse().unwrap();

        let mut buf = vec![0x00];
        buf.extend_from_slice(id.as_bytes());
        buf.push(0x00);
        buf.push(0x01);
        buf.extend_from_slice(&[0x01, 0xbb]);
        buf.push(0x01);
        buf.extend_from_slice(&[203, 0, 113, 7]);
        buf.extend_from_slice(b"initial-bytes");

        let intent = sniff(&buf, &secrets).unwrap();
        assert_eq!(intent.port, 443);
        assert_eq!(intent.host, "203.0.113.7");
        assert_eq!(intent.payload.as_ref(), b"initial-bytes");
    }

    #[test]
    fn test_read_address_ipv6_rendering() {
        let mut raw = vec![0u8; 16];
        raw[0] = 0x20;
        raw[1] = 0x01;
        raw[2] = 0x0d;
        raw[3] = 0xb8;
        raw[15] = 0x01;
        let (host, consumed) = read_address(&raw, 0, AddressField::Ipv6).unwrap();
        assert_eq!(host, "2001:0db8:0000:0000:0000:0000:0000:0001");
        assert_eq!(consumed, 16);
    }

    #[test]
    fn test_read_address_domain_invalid_utf8() {
        let raw = [3u8, 0xff, 0xfe, 0xfd];
        assert_eq!(
            read_address(&raw, 0, AddressField::Domain).unwrap_err(),
            HandshakeFailure::MalformedFraming
        );
    }
}
