//! `netretry fetch` - download a URL with wait-for-network retries.

use crate::ProbeArgs;
use anyhow::{Context, Result};
use clap::Args;
use netretry::{Backoff, NetworkConfig, NetworkRetry};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// URL to fetch
    pub url: String,

    /// Maximum number of request attempts
    #[arg(long, default_value_t = NetworkConfig::MAX_RECONNECT_ATTEMPTS)]
    pub max_attempts: u32,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = NetworkConfig::REQUEST_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// Wait before each retry with exponential backoff
    #[arg(long)]
    pub backoff: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub probe: ProbeArgs,
}

/// What a completed fetch reports on stdout.
#[derive(Debug, Serialize)]
struct FetchReport {
    url: String,
    status: u16,
    bytes: usize,
    elapsed_ms: u64,
}

pub async fn run(args: FetchArgs) -> Result<()> {
    let monitor = Arc::new(args.probe.monitor()?);

    let mut builder = NetworkRetry::builder(monitor)
        .max_attempts(args.max_attempts)
        .check_internet(!args.probe.no_internet_check)
        .on_waiting(|attempt| warn!(attempt, "Offline, waiting for the network before retrying"));
    if args.backoff {
        builder = builder.backoff(Backoff::new());
    }
    let retry = builder.build()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(args.timeout_ms))
        .user_agent(NetworkConfig::USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    let started = Instant::now();
    let url = args.url.clone();
    let (status, bytes) = retry
        .run(|| {
            let request = client.get(&url);
            async move {
                let response = request.send().await?.error_for_status()?;
                let status = response.status().as_u16();
                let body = response.bytes().await?;
                Ok::<_, reqwest::Error>((status, body.len()))
            }
        })
        .await
        .with_context(|| format!("Failed to fetch {}", args.url))?;

    let report = FetchReport {
        url: args.url,
        status,
        bytes,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(status = report.status, bytes = report.bytes, "Fetch complete");

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{} {} ({} bytes)", report.status, report.url, report.bytes);
    }
    Ok(())
}
