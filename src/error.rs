//! Error types for the pulsefeed gateway.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a connection.
#[derive(Error, Debug)]
pub enum Error {
    /// The first message matched neither handshake format.
    ///
    /// Deliberately opaque: the sub-reason (bad auth, bad framing,
    /// unsupported command or address type, truncation) is never exposed,
    /// so an active prober cannot distinguish "wrong protocol" from
    /// "right protocol, wrong secret". The connection stays in decoy mode.
    #[error("unrecognized handshake")]
    BadHandshake,

    /// The outbound connection to the requested destination failed.
    /// Fatal to the relay attempt; the client socket is closed. No retry.
    #[error("upstream unreachable: {host}:{port}")]
    UpstreamUnreachable {
        /// Destination host from the handshake.
        host: String,
        /// Destination port from the handshake.
        port: u16,
        /// Underlying connect error.
        #[source]
        source: std::io::Error,
    },

    /// Network I/O error on an established connection.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error leaves the connection in decoy mode rather
    /// than closing it.
    pub fn keeps_decoy_running(&self) -> bool {
        matches!(self, Error::BadHandshake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::BadHandshake.to_string(), "unrecognized handshake");

        let err = Error::UpstreamUnreachable {
            host: "example.com".into(),
            port: 443,
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "upstream unreachable: example.com:443");
    }

    #[test]
    fn test_decoy_classification() {
        assert!(Error::BadHandshake.keeps_decoy_running());
        assert!(!Error::Config("x".into()).keeps_decoy_running());
    }
}
