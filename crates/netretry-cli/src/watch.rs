//! `netretry watch` - print network availability changes.

use crate::ProbeArgs;
use anyhow::Result;
use clap::Args;
use futures::StreamExt;
use netretry::{observe_network_availability, ConnectivityObserver};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print one JSON object per change
    #[arg(long)]
    pub json: bool,

    /// Stop after this many changes
    #[arg(long)]
    pub count: Option<usize>,

    #[command(flatten)]
    pub probe: ProbeArgs,
}

#[derive(Debug, Serialize)]
struct AvailabilityChange {
    available: bool,
    elapsed_ms: u64,
}

fn render(change: &AvailabilityChange, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(change)?);
    }
    let label = if change.available { "online" } else { "offline" };
    Ok(format!("{:>8}ms {}", change.elapsed_ms, label))
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let monitor = Arc::new(args.probe.monitor()?);
    let observer: Arc<dyn ConnectivityObserver> = monitor.clone();
    let check_internet = !args.probe.no_internet_check;

    info!(check_internet, "Watching network availability");
    let started = Instant::now();
    let changes = observe_network_availability(observer, check_internet);
    let mut changes = match args.count {
        Some(count) => changes.take(count).boxed(),
        None => changes,
    };

    loop {
        tokio::select! {
            change = changes.next() => {
                let Some(available) = change else { break };
                let change = AvailabilityChange {
                    available,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                println!("{}", render(&change, args.json)?);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }

    info!(state = %monitor.connectivity(), "Stopped watching");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain() {
        let change = AvailabilityChange {
            available: false,
            elapsed_ms: 1500,
        };
        assert_eq!(render(&change, false).unwrap(), "    1500ms offline");
    }

    #[test]
    fn test_render_json() {
        let change = AvailabilityChange {
            available: true,
            elapsed_ms: 12,
        };
        let json: serde_json::Value = serde_json::from_str(&render(&change, true).unwrap()).unwrap();
        assert_eq!(json["available"], true);
        assert_eq!(json["elapsed_ms"], 12);
    }
}
