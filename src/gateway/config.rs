//! Gateway configuration.
//!
//! Settings come from environment variables so the gateway can run on
//! minimal container hosts without a config file. The two secrets are
//! required; everything else has a working default.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::HandshakeSecrets;
use crate::DEFAULT_WS_PATH;

/// Domains that non-tunnel requests are redirected to, disguising the
/// rejection as a data-source redirect.
pub const FALLBACK_DATA_SOURCES: [&str; 6] = [
    "bilibili.com",
    "weibo.com",
    "douyin.com",
    "huya.com",
    "cloudflare.com",
    "v2ex.com",
];

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// WebSocket path the tunnel endpoint is served at.
    pub ws_path: String,
    /// 16-byte client identifier for VLESS-style handshakes.
    pub user_id: Uuid,
    /// Passphrase for Trojan-style handshakes.
    pub passphrase: String,
    /// Redirect targets for requests that miss the tunnel path.
    pub fallback_domains: Vec<String>,
}

impl GatewayConfig {
    /// Load configuration from the environment.
    ///
    /// Required: `PULSEFEED_USER_ID` (UUID), `PULSEFEED_PASSPHRASE`.
    /// Optional: `PULSEFEED_LISTEN_ADDR` (default `0.0.0.0`), `PORT`
    /// (default `8080`), `PULSEFEED_WS_PATH`, and
    /// `PULSEFEED_FALLBACK_DOMAINS` (comma-separated).
    pub fn from_env() -> Result<Self> {
        let user_id: Uuid = std::env::var("PULSEFEED_USER_ID")
            .map_err(|_| Error::config("PULSEFEED_USER_ID must be set"))?
            .parse()
            .map_err(|_| Error::config("PULSEFEED_USER_ID is not a valid UUID"))?;

        let passphrase = std::env::var("PULSEFEED_PASSPHRASE")
            .map_err(|_| Error::config("PULSEFEED_PASSPHRASE must be set"))?;

        let listen_addr =
            std::env::var("PULSEFEED_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0".into());

        let listen_port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::config(format!("PORT is not a valid port: {raw}")))?,
            Err(_) => 8080,
        };

        let ws_path =
            std::env::var("PULSEFEED_WS_PATH").unwrap_or_else(|_| DEFAULT_WS_PATH.into());

        let fallback_domains = match std::env::var("PULSEFEED_FALLBACK_DOMAINS") {
            Ok(raw) => raw
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            Err(_) => FALLBACK_DATA_SOURCES.iter().map(|d| d.to_string()).collect(),
        };

        let config = Self {
            listen_addr,
            listen_port,
            ws_path,
            user_id,
            passphrase,
            fallback_domains,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::config("listen_addr cannot be empty"));
        }
        if !self.ws_path.starts_with('/') {
            return Err(Error::config("ws_path must start with '/'"));
        }
        if self.passphrase.is_empty() {
            return Err(Error::config("passphrase cannot be empty"));
        }
        if self.fallback_domains.is_empty() {
            return Err(Error::config("at least one fallback domain is required"));
        }
        Ok(())
    }

    /// Derive the handshake secrets the sniffer validates against.
    pub fn secrets(&self) -> HandshakeSecrets {
        HandshakeSecrets::new(self.user_id, &self.passphrase)
    }
}
