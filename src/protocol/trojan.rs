//! Trojan-style handshake decoding.
//!
//! Wire layout:
//!
//! ```text
//! hex_sha224(passphrase)(56) + CRLF + addr_type(1) + address
//! + port(2, BE) + CRLF + payload(rest)
//! ```
//!
//! Address type codes: 1 = IPv4, 3 = domain, 4 = IPv6. These differ from
//! the VLESS-style codes on purpose.

use bytes::Bytes;

use super::{
    read_address, AddressField, ConnectionIntent, HandshakeFailure, HandshakeSecrets, ProtocolKind,
};

/// Length of the lowercase hex SHA-224 digest field.
const DIGEST_LEN: usize = 56;

/// Decode a Trojan-style handshake from the first message of a socket.
pub(crate) fn decode(
    data: &[u8],
    secrets: &HandshakeSecrets,
) -> Result<ConnectionIntent, HandshakeFailure> {
    // digest(56) + CRLF(2) + addr_type(1) + shortest address(1) + port(2)
    if data.len() < DIGEST_LEN + 6 {
        return Err(HandshakeFailure::TruncatedPacket);
    }

    if &data[..DIGEST_LEN] != secrets.trojan_digest() {
        return Err(HandshakeFailure::AuthFailed);
    }

    if data[DIGEST_LEN] != b'\r' || data[DIGEST_LEN + 1] != b'\n' {
        return Err(HandshakeFailure::MalformedFraming);
    }

    let mut offset = DIGEST_LEN + 2;
    let field = match data[offset] {
        0x01 => AddressField::Ipv4,
        0x03 => AddressField::Domain,
        0x04 => AddressField::Ipv6,
        other => return Err(HandshakeFailure::UnsupportedAddressType(other)),
    };
    offset += 1;

    let (host, mut offset) = read_address(data, offset, field)?;

    if data.len() < offset + 4 {
        return Err(HandshakeFailure::TruncatedPacket);
    }

    let port = u16::from_be_bytes([data[offset], data[offset + 1]]);
    offset += 2;

    if data[offset] != b'\r' || data[offset + 1] != b'\n' {
        return Err(HandshakeFailure::MalformedFraming);
    }
    offset += 2;

    Ok(ConnectionIntent {
        host,
        port,
        payload: Bytes::copy_from_slice(&data[offset..]),
        kind: ProtocolKind::Trojan,
    })
}
