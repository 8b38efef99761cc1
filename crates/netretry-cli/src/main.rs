//! netretry - command-line front end for the network retry controller.
//!
//! `fetch` downloads a URL, waiting for the internet to come back whenever the
//! transfer fails with a connectivity error. `watch` prints network
//! availability changes until interrupted.

mod fetch;
mod watch;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use netretry::{ConnectivityMonitor, NetworkConfig, ProbeConfig, ProbeStrategy};
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "netretry")]
#[command(about = "Run network requests that wait out connectivity loss")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a URL, retrying after connectivity returns
    Fetch(fetch::FetchArgs),
    /// Print network availability changes
    Watch(watch::WatchArgs),
}

/// Reachability probe options shared by every subcommand.
#[derive(Args, Debug, Clone)]
struct ProbeArgs {
    /// URL that answers 204 when the internet is reachable
    #[arg(long, default_value = NetworkConfig::WALLED_GARDEN_URL)]
    probe_url: String,

    /// Delay between reachability probes in milliseconds
    #[arg(long, default_value_t = NetworkConfig::PROBE_INTERVAL.as_millis() as u64)]
    probe_interval_ms: u64,

    /// Only wait for the network link, never probe the internet
    #[arg(long)]
    no_internet_check: bool,
}

impl ProbeArgs {
    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::new()
            .with_strategy(ProbeStrategy::WalledGarden {
                url: self.probe_url.clone(),
            })
            .with_interval(Duration::from_millis(self.probe_interval_ms))
    }

    /// The CLI has no platform link callbacks, so the link is reported up and
    /// the probe decides reachability.
    fn monitor(&self) -> Result<ConnectivityMonitor> {
        let config = self.probe_config();
        debug!(url = %self.probe_url, interval_ms = self.probe_interval_ms, "Configuring reachability probe");
        Ok(ConnectivityMonitor::with_http_probe(true, &config)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean on stdout
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Command::Fetch(args) => fetch::run(args).await,
        Command::Watch(args) => watch::run(args).await,
    }
}
