//! Bidirectional relay between a validated client socket and its
//! upstream TCP destination.
//!
//! The relay owns both endpoints for its lifetime. Two pumps run
//! concurrently — client→upstream and upstream→client — joined with
//! `select!`: whichever terminates first (clean end-of-stream, transport
//! error, or remote close) cancels the other, and both endpoints are torn
//! down before the relay returns. There are no retries; an upstream
//! connect failure is terminal for the attempt.

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::{Error, Result};
use crate::protocol::{ConnectionIntent, ProtocolKind};
use crate::RELAY_BUFFER_SIZE;

/// Fixed acknowledgement written to VLESS-style clients once the
/// upstream connection is open. Trojan-style clients get no reply.
pub const VLESS_ACK: [u8; 2] = [0x00, 0x00];

/// Run the relay to completion.
///
/// `inbound` yields the client's WebSocket frames (the handshake frame
/// has already been consumed); `out` is the connection's outbound queue.
/// The intent's captured payload seeds the client→upstream direction
/// before any further frames are forwarded.
pub async fn run<S>(
    inbound: &mut S,
    out: &mpsc::Sender<Message>,
    intent: ConnectionIntent,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let upstream = TcpStream::connect((intent.host.as_str(), intent.port))
        .await
        .map_err(|source| Error::UpstreamUnreachable {
            host: intent.host.clone(),
            port: intent.port,
            source,
        })?;
    upstream.set_nodelay(true)?;

    tracing::debug!(
        host = %intent.host,
        port = intent.port,
        kind = ?intent.kind,
        "upstream connected, relaying"
    );

    if intent.kind == ProtocolKind::Vless && out.send(Message::Binary(VLESS_ACK.to_vec())).await.is_err() {
        // Client socket already gone; nothing to relay.
        return Ok(());
    }

    let (mut up_reader, mut up_writer) = upstream.into_split();

    // Bytes captured during handshake parsing go first, before any
    // frame that arrives later.
    if !intent.payload.is_empty() {
        up_writer.write_all(&intent.payload).await?;
    }

    let client_to_upstream = async {
        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(Message::Binary(data)) => {
                    if up_writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                // Control and text frames carry no tunnel bytes.
                Ok(_) => {}
            }
        }
        let _ = up_writer.shutdown().await;
    };

    let upstream_to_client = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        loop {
            match up_reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if out.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
    };

    // Either direction ending cancels the other; both halves drop here,
    // closing the upstream connection.
    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }

    Ok(())
}
