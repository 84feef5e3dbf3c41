//! Policy Gateway
//!
//! Route and security-policy resolution engine served over HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────────┐
//!                              │                    POLICY GATEWAY                     │
//!                              │                                                       │
//!     Client Request           │  ┌─────────┐    ┌──────────┐    ┌──────────────┐      │
//!     ─────────────────────────┼─▶│  http   │───▶│ dispatch │───▶│   routing    │      │
//!                              │  │ server  │    │          │    │ RouteTable   │      │
//!                              │  └─────────┘    └────┬─────┘    └──────────────┘      │
//!                              │                      │                                │
//!                              │                      ▼                                │
//!                              │               ┌──────────────┐                        │
//!                              │               │   security   │                        │
//!                              │               │ PolicyChain  │                        │
//!                              │               └──────┬───────┘                        │
//!     Decision (200 / 4xx)     │  ┌─────────┐         │                                │
//!     ◀────────────────────────┼──│response │◀────────┘                                │
//!                              │  └─────────┘                                          │
//!                              │                                                       │
//!                              │  ┌─────────────────────────────────────────────────┐  │
//!                              │  │              Cross-Cutting Concerns              │  │
//!                              │  │  ┌────────┐ ┌───────┐ ┌────────────┐ ┌────────┐ │  │
//!                              │  │  │ config │ │ admin │ │observabil- │ │lifecyc-│ │  │
//!                              │  │  │+reload │ │  API  │ │ity+records │ │  le    │ │  │
//!                              │  │  └────────┘ └───────┘ └────────────┘ └────────┘ │  │
//!                              │  └─────────────────────────────────────────────────┘  │
//!                              └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use policy_gateway::config::{load_config, GatewayConfig};
use policy_gateway::lifecycle::startup;
use policy_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "policy-gateway")]
#[command(about = "Route and security-policy resolution gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(Some(&config.observability.log_level));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "policy-gateway starting");

    if args.check {
        tracing::info!(
            routes = config.routes.len(),
            policies = config.policies.len(),
            "Configuration is valid"
        );
        return Ok(());
    }

    startup::run(config, args.config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
