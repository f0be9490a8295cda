//! # Pulsefeed
//!
//! A tunnel gateway hidden behind a real-time analytics feed.
//!
//! A single WebSocket endpoint multiplexes two binary proxy handshake
//! protocols (VLESS-style and Trojan-style). Until a valid handshake
//! arrives, every socket looks like a live telemetry stream: the gateway
//! emits statistically plausible synthetic events on a randomized,
//! session-shaped schedule.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Gateway (front door)                    │
//! │     WebSocket upgrade at one path, redirect elsewhere     │
//! ├──────────────────────────────────────────────────────────┤
//! │              ConnectionSupervisor (per socket)            │
//! │   DecoyOnly ──first message──▶ sniff ──ok──▶ Relaying     │
//! │       ▲                          │                        │
//! │       └──────────bad handshake───┘                        │
//! ├───────────────┬──────────────────┬───────────────────────┤
//! │  DecoyEngine  │ ProtocolSniffer  │      RelayPump        │
//! │  (telemetry)  │  (pure decoder)  │ (bidirectional bytes) │
//! └───────────────┴──────────────────┴───────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **Concealment**: a probed socket is indistinguishable from an
//!    analytics feed; handshake failures never leak a sub-reason.
//! 2. **Isolation**: all per-connection state is owned by that
//!    connection's task; the only values shared across connections are
//!    the two configured secrets.
//! 3. **Clean teardown**: decoy timers and relay endpoints are torn down
//!    exactly once, and closing a closed connection is a no-op.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod decoy;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod relay;

pub use error::{Error, Result};

/// WebSocket path the tunnel endpoint is served at by default.
pub const DEFAULT_WS_PATH: &str = "/ws/realtime-data";

/// Read buffer size for the upstream→client relay direction.
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Outbound message queue depth per connection.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;
