//! Odnix Gateway Binary
//!
//! Command-line interface for running the gateway.
//!
//! ## Usage
//!
//! ```bash
//! odnix-gateway --port 7443 --max-clients 1024
//! ```

use clap::Parser;
use odnix_gateway::{GatewayConfig, OdnixGateway};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Odnix Gateway - secure transport endpoint for call signalling and chat
#[derive(Parser, Debug)]
#[command(name = "odnix-gateway")]
#[command(version)]
#[command(about = "Odnix secure transport gateway", long_about = None)]
struct Args {
    /// Bind address
    #[arg(short = 'a', long, default_value = "0.0.0.0")]
    address: String,

    /// Bind port
    #[arg(short = 'p', long, default_value_t = 7443)]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(short = 'm', long, default_value_t = 1024)]
    max_clients: usize,

    /// Configuration file path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Handshake timeout in seconds
    #[arg(long, default_value_t = 30)]
    handshake_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Generate sample configuration file
    #[arg(long)]
    generate_config: Option<PathBuf>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Handle generate-config option
    if let Some(path) = args.generate_config {
        let config = GatewayConfig::default();
        config.save_to_file(&path)?;
        println!("Generated sample configuration at: {}", path.display());
        return Ok(());
    }

    // Load or build configuration
    let config = if let Some(config_path) = &args.config {
        GatewayConfig::load_from_file(config_path)?
    } else {
        GatewayConfig::builder()
            .bind_address(&args.address)
            .bind_port(args.port)
            .max_connections(args.max_clients)
            .handshake_timeout(args.handshake_timeout)
            .log_level(args.log_level.as_deref().unwrap_or("info"))
            .build()?
    };

    // CLI level wins over the file
    let level = parse_level(args.log_level.as_deref().unwrap_or(&config.log_level));

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    if let Some(config_path) = &args.config {
        info!("Loaded configuration from: {}", config_path.display());
    }

    info!("Configuration:");
    info!("  Bind: {}:{}", config.bind_address, config.bind_port);
    info!("  Max connections: {}", config.max_connections);
    info!("  Handshake timeout: {}s", config.handshake_timeout_secs);
    info!("  Idle timeout: {}s", config.idle_timeout_secs);
    info!("  Payload layout: {:?}", config.session.layout);
    info!("  Verify message key: {}", config.session.verify_message_key);

    let gateway = OdnixGateway::new(config);

    // Handle Ctrl+C
    let stopper = gateway.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received shutdown signal");
        stopper.stop();
    });

    match gateway.start().await {
        Ok(()) => {
            info!("Gateway stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Gateway error: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["odnix-gateway", "--port", "8080", "--handshake-timeout", "5"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.handshake_timeout, 5);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
