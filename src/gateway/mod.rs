//! Gateway server.
//!
//! Implements the public WebSocket endpoint with:
//!
//! 1. **Path gating**: only the configured tunnel path upgrades; every
//!    other request is answered with a 302 redirect to a rotating set of
//!    high-traffic domains.
//! 2. **Single writer**: each connection's outbound frames are funneled
//!    through one queue into one writer task, so decoy and relay output
//!    never interleave mid-frame.
//! 3. **Uniform cover**: every upgraded socket looks identical until a
//!    valid handshake arrives.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Gateway                               │
//! │  ┌──────────────────┐   ┌─────────────────┐  ┌─────────────┐  │
//! │  │   TCP Listener   │──▶│  Upgrade Gate   │─▶│  302 Cover  │  │
//! │  │                  │   │  (path match)   │  │  Redirect   │  │
//! │  └──────────────────┘   └────────┬────────┘  └─────────────┘  │
//! │                                  ▼                             │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │               Connection Supervisor                       │ │
//! │  │  • decoy feed from the first moment                      │ │
//! │  │  • one handshake attempt per socket                      │ │
//! │  │  • hands off to the relay on success                     │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod metrics;
mod supervisor;

pub use config::{GatewayConfig, FALLBACK_DATA_SOURCES};
pub use metrics::GatewayMetrics;
pub use supervisor::ConnectionSupervisor;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rand::seq::SliceRandom;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::protocol::HandshakeSecrets;
use crate::OUTBOUND_QUEUE_DEPTH;

/// Main gateway instance.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    secrets: Arc<HandshakeSecrets>,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Create a new gateway with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let secrets = Arc::new(config.secrets());
        Self {
            config: Arc::new(config),
            secrets,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    /// Start the gateway.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.listen_addr, self.config.listen_port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("pulsefeed gateway listening on {}", addr);

        self.serve(listener).await
    }

    async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let config = Arc::clone(&self.config);
                    let secrets = Arc::clone(&self.secrets);
                    let metrics = Arc::clone(&self.metrics);

                    tokio::spawn(async move {
                        metrics.increment_connections();

                        if let Err(e) =
                            handle_connection(config, secrets, Arc::clone(&metrics), stream).await
                        {
                            tracing::debug!("connection from {} ended: {}", peer_addr, e);
                        }

                        metrics.decrement_connections();
                    });
                }
                Err(e) => {
                    tracing::warn!("accept error: {}", e);
                }
            }
        }
    }

    /// Get gateway metrics.
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}

/// Build the cover response for a request that misses the tunnel path: a
/// plain 302 to a random high-traffic domain, indistinguishable from a
/// data-source redirect.
fn redirect_response(fallback_domains: &[String]) -> ErrorResponse {
    let domain = fallback_domains
        .choose(&mut rand::thread_rng())
        .map(String::as_str)
        .unwrap_or("cloudflare.com");

    tokio_tungstenite::tungstenite::http::Response::builder()
        .status(StatusCode::FOUND)
        .header("location", format!("https://{domain}/"))
        .body(None)
        .expect("static redirect response")
}

async fn handle_connection(
    config: Arc<GatewayConfig>,
    secrets: Arc<HandshakeSecrets>,
    metrics: Arc<GatewayMetrics>,
    stream: TcpStream,
) -> Result<()> {
    stream.set_nodelay(true)?;

    let ws_path = config.ws_path.clone();
    let fallbacks = config.fallback_domains.clone();
    let ws_stream = match accept_hdr_async(stream, move |req: &Request, response: Response| {
        if req.uri().path() == ws_path {
            Ok(response)
        } else {
            tracing::debug!(path = %req.uri().path(), "non-tunnel request, redirecting");
            Err(redirect_response(&fallbacks))
        }
    })
    .await
    {
        Ok(ws_stream) => ws_stream,
        Err(_) => {
            // Either the redirect was served or the client never spoke
            // HTTP; both are a normal end of the conversation.
            return Ok(());
        }
    };

    let (mut sink, mut inbound) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);

    // Sole owner of the write half. Decoy, relay, and supervisor all
    // feed the same queue, so frames can never interleave.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let supervisor = ConnectionSupervisor::new(secrets, metrics);
    let result = supervisor.run(&mut inbound, out_tx).await;

    // All senders are gone once run returns, so the writer drains the
    // queue and exits on its own.
    let _ = writer.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_support::{vless_packet, TEST_PASSPHRASE, TEST_UUID};
    use crate::DEFAULT_WS_PATH;
    use futures_util::SinkExt;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_gateway() -> Gateway {
        Gateway::new(GatewayConfig {
            listen_addr: "127.0.0.1".into(),
            listen_port: 0,
            ws_path: DEFAULT_WS_PATH.into(),
            user_id: TEST_UUID.parse().unwrap(),
            passphrase: TEST_PASSPHRASE.into(),
            fallback_domains: vec!["cloudflare.com".into()],
        })
    }

    async fn spawn_gateway() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = test_gateway().serve(listener).await;
        });
        port
    }

    #[test]
    fn test_redirect_response_shape() {
        let domains = vec!["weibo.com".to_string()];
        let response = redirect_response(&domains);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://weibo.com/"
        );
    }

    #[tokio::test]
    async fn test_wrong_path_gets_redirect() {
        let port = spawn_gateway().await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /admin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let response = String::from_utf8_lossy(&raw);
        assert!(response.starts_with("HTTP/1.1 302"), "got: {response}");
        assert!(response.to_lowercase().contains("location: https://cloudflare.com/"));
    }

    #[tokio::test]
    async fn test_tunnel_path_upgrades_and_greets() {
        let port = spawn_gateway().await;

        let url = format!("ws://127.0.0.1:{port}{DEFAULT_WS_PATH}");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(parsed["status"], "connected");
            }
            other => panic!("expected greeting, got {other:?}"),
        }

        ws.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_vless_relay() {
        // Echo upstream.
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = upstream.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });

        let port = spawn_gateway().await;
        let url = format!("ws://127.0.0.1:{port}{DEFAULT_WS_PATH}");
        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        let handshake = vless_packet(
            TEST_UUID.parse().unwrap(),
            &[0x01, 127, 0, 0, 1],
            upstream_port,
            b"over-the-wire",
        );
        ws.send(Message::Binary(handshake)).await.unwrap();

        // Skip feed chatter; the first binary frame is the ack, the
        // following ones are the echoed payload.
        let mut saw_ack = false;
        let mut echoed = Vec::new();
        while echoed.len() < b"over-the-wire".len() {
            match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) if !saw_ack => {
                    assert_eq!(data, vec![0x00, 0x00]);
                    saw_ack = true;
                }
                Message::Binary(data) => echoed.extend_from_slice(&data),
                Message::Text(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(echoed, b"over-the-wire");

        ws.close(None).await.unwrap();
    }
}
