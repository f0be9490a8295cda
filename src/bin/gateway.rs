//! Pulsefeed Gateway Binary
//!
//! Usage: pulsefeed-gateway [OPTIONS]
//!
//! All configuration comes from the environment; see `--help`.

use std::env;

use pulsefeed::gateway::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                return Ok(());
            }
        }
    }

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        ws_path = %config.ws_path,
        "configuration loaded, starting gateway"
    );

    Gateway::new(config).run().await?;
    Ok(())
}

fn print_usage() {
    println!(
        r#"Pulsefeed Gateway - real-time data feed endpoint

USAGE:
    pulsefeed-gateway [OPTIONS]

OPTIONS:
    -h, --help    Print help information

ENVIRONMENT:
    PULSEFEED_USER_ID            Client identifier, UUID form (required)
    PULSEFEED_PASSPHRASE         Client passphrase (required)
    PULSEFEED_LISTEN_ADDR        Bind address (default: 0.0.0.0)
    PORT                         Bind port (default: 8080)
    PULSEFEED_WS_PATH            Feed endpoint path (default: /ws/realtime-data)
    PULSEFEED_FALLBACK_DOMAINS   Comma-separated redirect targets
    RUST_LOG                     Log filter (default: info)

EXAMPLE:
    PULSEFEED_USER_ID=9c4a8620-23a1-4f8e-b3d1-0a5c7e2f9b41 \
    PULSEFEED_PASSPHRASE=orange-turbine-88 \
    pulsefeed-gateway
"#
    );
}
