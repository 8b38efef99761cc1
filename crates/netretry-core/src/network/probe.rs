//! Internet reachability probes.
//!
//! A network link does not prove the internet is reachable (captive portals,
//! dead upstreams). A probe makes a lightweight HTTP request to decide.

use crate::config::{NetworkConfig, ProbeConfig, ProbeStrategy};
use crate::error::{NetRetryError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Active check for real internet access.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns true when the internet is reachable. Never fails: any error is
    /// an unreachable result.
    async fn probe(&self) -> bool;
}

/// Shared handle to a reachability probe.
pub type DynReachabilityProbe = Arc<dyn ReachabilityProbe>;

/// Reachability probe over HTTP.
pub struct HttpProbe {
    client: Client,
    strategy: ProbeStrategy,
}

impl HttpProbe {
    /// Create a probe using the default walled-garden endpoint.
    pub fn new() -> Result<Self> {
        Self::with_config(&ProbeConfig::default())
    }

    /// Create a probe from a validated configuration.
    pub fn with_config(config: &ProbeConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| NetRetryError::Config {
                message: format!("Failed to create probe client: {}", e),
            })?;

        Ok(Self {
            client,
            strategy: config.strategy.clone(),
        })
    }

    pub fn strategy(&self) -> &ProbeStrategy {
        &self.strategy
    }

    async fn probe_walled_garden(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let reachable = resp.status() == StatusCode::NO_CONTENT;
                if !reachable {
                    // Anything but 204 means something in between answered.
                    debug!(url, status = %resp.status(), "Walled garden probe intercepted");
                }
                reachable
            }
            Err(e) => {
                debug!(url, error = %e, "Probe request failed");
                false
            }
        }
    }

    async fn probe_head(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                // Rate limiting still proves the network works
                status.is_success() || status.is_redirection() || status == StatusCode::FORBIDDEN
            }
            Err(e) => {
                debug!(url, error = %e, "Probe request failed");
                false
            }
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match &self.strategy {
            ProbeStrategy::WalledGarden { url } => self.probe_walled_garden(url).await,
            ProbeStrategy::Head { urls } => {
                for url in urls {
                    if self.probe_head(url).await {
                        return true;
                    }
                    debug!("Probe failed for {}", url);
                }
                false
            }
        }
    }
}
