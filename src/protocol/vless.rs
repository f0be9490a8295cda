//! VLESS-style handshake decoding.
//!
//! Wire layout:
//!
//! ```text
//! version(1) + uuid(16) + addon_len(1) + addons(N) + command(1)
//! + port(2, BE) + addr_type(1) + address + payload(rest)
//! ```
//!
//! Address type codes: 1 = IPv4, 2 = domain, 3 = IPv6. These differ from
//! the Trojan-style codes on purpose.

use bytes::Bytes;
use uuid::Uuid;

use super::{
    read_address, AddressField, ConnectionIntent, HandshakeFailure, HandshakeSecrets, ProtocolKind,
};

/// TCP connect is the only supported command.
const CMD_TCP: u8 = 0x01;

/// Decode a VLESS-style handshake from the first message of a socket.
pub(crate) fn decode(
    data: &[u8],
    secrets: &HandshakeSecrets,
) -> Result<ConnectionIntent, HandshakeFailure> {
    // version(1) + uuid(16) + addon_len(1) is the minimum prefix.
    if data.len() < 18 {
        return Err(HandshakeFailure::TruncatedPacket);
    }

    // Byte 0 is the protocol version and is ignored.
    let id = Uuid::from_slice(&data[1..17]).map_err(|_| HandshakeFailure::AuthFailed)?;
    if id != secrets.user_id {
        return Err(HandshakeFailure::AuthFailed);
    }

    let mut offset = 17;
    let addons_len = data[offset] as usize;
    offset += 1;

    // Addon contents are skipped, but must be fully present.
    if data.len() < offset + addons_len {
        return Err(HandshakeFailure::TruncatedPacket);
    }
    offset += addons_len;

    // command(1) + port(2) + addr_type(1)
    if data.len() < offset + 4 {
        return Err(HandshakeFailure::TruncatedPacket);
    }

    if data[offset] != CMD_TCP {
        return Err(HandshakeFailure::UnsupportedCommand(data[offset]));
    }
    offset += 1;

    let port = u16::from_be_bytes([data[offset], data[offset + 1]]);
    offset += 2;

    let field = match data[offset] {
        0x01 => AddressField::Ipv4,
        0x02 => AddressField::Domain,
        0x03 => AddressField::Ipv6,
        other => return Err(HandshakeFailure::UnsupportedAddressType(other)),
    };
    offset += 1;

    let (host, offset) = read_address(data, offset, field)?;

    Ok(ConnectionIntent {
        host,
        port,
        payload: Bytes::copy_from_slice(&data[offset..]),
        kind: ProtocolKind::Vless,
    })
}
