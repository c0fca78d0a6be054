//! uptimesquirrel-agent: reports host metrics to the UptimeSquirrel API.
//!
//! Run without flags to report forever at the configured interval.
//! `--test` runs a single cycle, `--status` prints the resolved
//! thresholds, `--register` announces this host to the API.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uptimesquirrel_agent::agent::Agent;
use uptimesquirrel_agent::config::{AgentConfig, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_PATH};
use uptimesquirrel_agent::metrics::{hostname, AGENT_VERSION};

/// UptimeSquirrel system monitoring agent.
#[derive(Parser, Debug)]
#[command(name = "uptimesquirrel-agent")]
#[command(version)]
#[command(about = "System monitoring agent for UptimeSquirrel", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run one collection/reporting cycle and exit
    #[arg(long)]
    test: bool,

    /// Show current configuration and thresholds, then exit
    #[arg(long)]
    status: bool,

    /// Register this host with the API, then exit
    #[arg(long)]
    register: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AgentConfig::load(&cli.config)?;
    let mut agent = Agent::new(config, Path::new(DEFAULT_CONFIG_DIR))?;

    if cli.status {
        agent.refresh_remote_config().await;
        print_status(&agent);
        return Ok(());
    }

    if cli.register {
        let reply = agent.register().await?;
        println!("Registration successful: {}", reply.message);
        return Ok(());
    }

    if cli.test {
        agent.run_once().await;
        return Ok(());
    }

    tokio::select! {
        () = agent.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down agent");
        }
    }

    Ok(())
}

fn print_status(agent: &Agent) {
    let thresholds = agent.thresholds();

    println!("UptimeSquirrel Agent v{AGENT_VERSION} Status");
    println!("Hostname: {}", hostname());
    println!("API URL: {}", agent.api_url());
    println!();
    println!("Current Thresholds:");
    println!("  CPU: {}%", thresholds.cpu());
    println!("  Memory: {}%", thresholds.memory());
    println!("  Disk: {}%", thresholds.disk());
    println!();
    println!("Threshold Version: {}", thresholds.version());
    println!(
        "Source: {}",
        if thresholds.is_remote() { "Remote (server)" } else { "Local (config file)" }
    );
}
