//! mcu-gateway entry point.
//!
//! # What happens at startup
//!
//! ```text
//! main()
//!  ├─ Cli::parse()                 -- --config / MCU_CONFIG
//!  ├─ load_config()                -- defaults if the file is missing
//!  ├─ tracing_subscriber init      -- RUST_LOG, else gateway.log_level
//!  ├─ discover(catalog())          -- plugins request links, subscribe
//!  ├─ Dispatcher                   -- keyword → command
//!  ├─ LinkRegistry::start_all()    -- one receive loop per link
//!  └─ wait for Ctrl-C, then stop_all()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcu_gateway::application::dispatch::Dispatcher;
use mcu_gateway::application::reporter::AttributeReporter;
use mcu_gateway::infrastructure::registry::LinkRegistry;
use mcu_gateway::infrastructure::reporter::LogReporter;
use mcu_gateway::infrastructure::storage::config::load_config;
use mcu_gateway::plugins::{catalog, discover, PluginContext};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Edge gateway between keyword-addressed intents and TCP/serial devices.
#[derive(Debug, Parser)]
#[command(name = "mcu-gateway", version)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = "mcu.toml", env = "MCU_CONFIG")]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.  Overrides
    /// `gateway.log_level` from the configuration file.
    #[arg(long)]
    log_level: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.gateway.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!("mcu-gateway starting with {}", cli.config.display());

    let reporter: Arc<dyn AttributeReporter> = Arc::new(LogReporter);
    let mut links = LinkRegistry::new(config.serial.poll_interval());

    let plugins = {
        let mut ctx = PluginContext {
            links: &mut links,
            reporter: Arc::clone(&reporter),
            config: &config,
        };
        discover(&catalog(), &mut ctx)
    };

    let mut dispatcher = Dispatcher::new(reporter);
    for plugin in plugins {
        plugin.install(&mut dispatcher);
    }

    links.start_all();

    info!(
        "mcu-gateway ready: {} command(s), {} service(s), {} link(s); keywords {:?}.  Press Ctrl-C to exit.",
        dispatcher.command_count(),
        dispatcher.service_count(),
        links.len(),
        dispatcher.keywords()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutdown signal received");
    links.stop_all();
    info!("mcu-gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mcu-gateway"]);
        assert_eq!(cli.config, PathBuf::from("mcu.toml"));
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["mcu-gateway", "--config", "/etc/mcu.toml", "--log-level", "debug"]);
        assert_eq!(cli.config, PathBuf::from("/etc/mcu.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
