//! Per-connection orchestration.
//!
//! The supervisor owns one socket's lifecycle: it starts the decoy feed
//! the moment the connection opens, offers only the first inbound binary
//! message to the handshake sniffer, and either hands the socket to the
//! relay (stopping the decoy) or leaves the decoy running for the rest of
//! the socket's life. Which logic consumes an inbound message is decided
//! by an explicit mode field, never by rebinding handlers at runtime.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::metrics::GatewayMetrics;
use crate::decoy::{self, DecoyEngine};
use crate::error::{Error, Result};
use crate::protocol::{self, HandshakeSecrets};
use crate::relay;

/// Override delay applied to the decoy's next tick while a handshake is
/// being validated, so feed chatter does not interleave with the handoff.
const HANDOFF_TAPER: Duration = Duration::from_secs(5);

/// Which logic consumes inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionMode {
    /// Emitting fake telemetry; at most one handshake attempt allowed.
    DecoyOnly,
    /// Handshake validated; the relay consumes all inbound frames.
    Relaying,
}

/// Orchestrates a single connection from open to close.
pub struct ConnectionSupervisor {
    secrets: Arc<HandshakeSecrets>,
    metrics: Arc<GatewayMetrics>,
    mode: ConnectionMode,
    /// Set once the first binary message has been offered to the
    /// sniffer; no further parse attempts are ever made.
    handshake_consumed: bool,
}

impl ConnectionSupervisor {
    /// Create the supervisor for a freshly opened socket.
    pub fn new(secrets: Arc<HandshakeSecrets>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            secrets,
            metrics,
            mode: ConnectionMode::DecoyOnly,
            handshake_consumed: false,
        }
    }

    /// Drive the connection to completion.
    ///
    /// Returns when the client goes away, when a relay finishes, or when
    /// an upstream connect fails. Parse failures never terminate the
    /// socket; it simply stays in decoy mode.
    pub async fn run<S>(mut self, inbound: &mut S, out: mpsc::Sender<Message>) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        if out.send(Message::Text(decoy::greeting())).await.is_err() {
            return Ok(());
        }

        // Decoy starts immediately so an observer sees plausible feed
        // traffic with no delay.
        let engine = DecoyEngine::spawn(out.clone());

        let mut result = Ok(());

        while let Some(frame) = inbound.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(_) => break,
            };

            match message {
                Message::Binary(data) if self.mode == ConnectionMode::DecoyOnly => {
                    if self.handshake_consumed {
                        // Failed validation earlier; everything after the
                        // first message is silently ignored.
                        continue;
                    }
                    self.handshake_consumed = true;
                    engine.defer_next_tick(HANDOFF_TAPER);

                    match protocol::sniff(&data, &self.secrets) {
                        Ok(intent) => {
                            engine.stop();
                            self.mode = ConnectionMode::Relaying;
                            self.metrics.increment_relays_established();
                            tracing::info!(
                                host = %intent.host,
                                port = intent.port,
                                kind = ?intent.kind,
                                "handshake accepted, starting relay"
                            );

                            result = self.run_relay(inbound, &out, intent).await;
                            break;
                        }
                        Err(_) => {
                            // Stay in decoy mode; the sub-reason is not
                            // surfaced and the socket is not closed.
                            self.metrics.increment_decoy_fallbacks();
                            tracing::debug!("first message failed validation, staying in decoy mode");
                        }
                    }
                }
                Message::Close(_) => break,
                // Pings are answered by the transport layer; text and
                // post-failure binary frames carry nothing for us.
                _ => {}
            }
        }

        // Idempotent: the relay path already stopped the engine.
        engine.stop();
        result
    }

    async fn run_relay<S>(
        &self,
        inbound: &mut S,
        out: &mpsc::Sender<Message>,
        intent: protocol::ConnectionIntent,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        match relay::run(inbound, out, intent).await {
            Ok(()) => {
                self.metrics.increment_relays_completed();
                let _ = out.send(Message::Close(None)).await;
                Ok(())
            }
            Err(err @ Error::UpstreamUnreachable { .. }) => {
                self.metrics.increment_upstream_failures();
                // Distinct close code so the client can tell connect
                // failure apart from a normal teardown.
                let _ = out
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Error,
                        reason: "upstream connection failed".into(),
                    })))
                    .await;
                Err(err)
            }
            Err(err) => {
                let _ = out.send(Message::Close(None)).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_support::{secrets, vless_packet, TEST_UUID};
    use futures_util::stream;
    use serde_json::Value;
    use std::pin::Pin;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type InboundStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

    fn inbound_from(rx: mpsc::Receiver<Message>) -> InboundStream {
        Box::pin(stream::unfold(rx, |mut rx| async {
            rx.recv().await.map(|msg| (Ok(msg), rx))
        }))
    }

    fn supervisor() -> ConnectionSupervisor {
        ConnectionSupervisor::new(Arc::new(secrets()), Arc::new(GatewayMetrics::new()))
    }

    fn metric_of(text: &str) -> String {
        let parsed: Value = serde_json::from_str(text).unwrap();
        parsed["metric"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_then_decoy_on_open() {
        let (_frame_tx, frame_rx) = mpsc::channel::<Message>(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);

        let mut inbound = inbound_from(frame_rx);
        tokio::spawn(async move { supervisor().run(&mut inbound, out_tx).await });

        match out_rx.recv().await.unwrap() {
            Message::Text(text) => {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(parsed["status"], "connected");
            }
            other => panic!("expected greeting, got {other:?}"),
        }

        match out_rx.recv().await.unwrap() {
            Message::Text(text) => assert_eq!(metric_of(&text), "user.login.success"),
            other => panic!("expected decoy login, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_handshake_keeps_decoy_running() {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);

        let mut inbound = inbound_from(frame_rx);
        let task = tokio::spawn(async move { supervisor().run(&mut inbound, out_tx).await });

        out_rx.recv().await.unwrap(); // greeting

        frame_tx
            .send(Message::Binary(b"not a handshake".to_vec()))
            .await
            .unwrap();

        // The socket is not closed and decoy events keep flowing.
        let mut decoy_events = 0;
        for _ in 0..3 {
            match out_rx.recv().await.unwrap() {
                Message::Text(_) => decoy_events += 1,
                Message::Close(_) => panic!("socket closed after bad handshake"),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(decoy_events, 3);

        drop(frame_tx);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_first_message_is_parsed() {
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(256);

        let mut inbound = inbound_from(frame_rx);
        let task = tokio::spawn(async move { supervisor().run(&mut inbound, out_tx).await });

        // Garbage first, then a perfectly valid handshake: the second
        // message must be ignored, so no relay (and no ack) ever starts.
        frame_tx.send(Message::Binary(vec![0xff; 64])).await.unwrap();
        let valid = vless_packet(
            TEST_UUID.parse().unwrap(),
            &[0x01, 127, 0, 0, 1],
            65000,
            b"",
        );
        frame_tx.send(Message::Binary(valid)).await.unwrap();
        drop(frame_tx);

        task.await.unwrap().unwrap();
        while let Some(message) = out_rx.recv().await {
            assert!(
                matches!(message, Message::Text(_)),
                "unexpected non-decoy frame: {message:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_valid_handshake_relays_and_closes() {
        // Echo upstream.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);

        let mut inbound = inbound_from(frame_rx);
        let task = tokio::spawn(async move { supervisor().run(&mut inbound, out_tx).await });

        let handshake = vless_packet(
            TEST_UUID.parse().unwrap(),
            &[0x01, 127, 0, 0, 1],
            port,
            b"ping",
        );
        frame_tx.send(Message::Binary(handshake)).await.unwrap();

        // Scan past greeting/decoy text for the ack, then the echo.
        let mut saw_ack = false;
        let mut echoed = Vec::new();
        while echoed.len() < 4 {
            match out_rx.recv().await.unwrap() {
                Message::Binary(data) if !saw_ack => {
                    assert_eq!(data, relay::VLESS_ACK.to_vec());
                    saw_ack = true;
                }
                Message::Binary(data) => echoed.extend_from_slice(&data),
                Message::Text(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(echoed, b"ping");

        drop(frame_tx); // client closes; relay ends
        task.await.unwrap().unwrap();

        // Normal teardown close frame is the last thing sent.
        let mut last = None;
        while let Some(message) = out_rx.recv().await {
            last = Some(message);
        }
        assert!(matches!(last, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_closes_with_error_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (frame_tx, frame_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(64);

        let mut inbound = inbound_from(frame_rx);
        let task = tokio::spawn(async move { supervisor().run(&mut inbound, out_tx).await });

        let handshake = vless_packet(
            TEST_UUID.parse().unwrap(),
            &[0x01, 127, 0, 0, 1],
            port,
            b"",
        );
        frame_tx.send(Message::Binary(handshake)).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::UpstreamUnreachable { .. })));

        let mut close_code = None;
        while let Some(message) = out_rx.recv().await {
            if let Message::Close(Some(frame)) = message {
                close_code = Some(frame.code);
            }
        }
        assert_eq!(close_code, Some(CloseCode::Error));
    }
}
