//! netretry - wait for network connectivity and retry async work.
//!
//! Wraps a re-invocable stream or future producer. Connectivity failures
//! (timeouts and I/O errors) suspend the operation until a
//! [`ConnectivityObserver`] reports the network, and optionally the internet,
//! as available again; then the producer is invoked again, up to a fixed
//! number of attempts. Anything else fails straight through.
//!
//! # Example
//!
//! ```rust,ignore
//! use netretry::{ConnectivityMonitor, NetworkRetry, ProbeConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let monitor = Arc::new(ConnectivityMonitor::with_http_probe(true, &ProbeConfig::default())?);
//!
//!     let retry = NetworkRetry::builder(monitor.clone())
//!         .max_attempts(3)
//!         .on_waiting(|attempt| println!("offline, waiting (attempt {attempt})"))
//!         .build()?;
//!
//!     let body = retry
//!         .run(|| async { reqwest::get("https://example.com").await?.text().await })
//!         .await?;
//!     println!("{} bytes", body.len());
//!
//!     // Platform callbacks keep the monitor current:
//!     monitor.set_network_connected(false);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod resource;

// Re-export commonly used types
pub use config::{Backoff, NetworkConfig, ProbeConfig, ProbeStrategy, RetryConfig};
pub use error::{NetRetryError, Result, RetryError};
pub use network::{
    observe_network_availability, wait_for_network, with_network_retry, ClassifyFailure,
    ConnectivityEvent, ConnectivityMonitor, ConnectivityObserver, ConnectivityState,
    ConnectivityStatus, DynConnectivityObserver, DynReachabilityProbe, FailureKind, HttpProbe,
    NetworkRetry, NetworkRetryBuilder, ReachabilityProbe, RetryState, WaitingCallback,
};
pub use resource::{use_and_ignore_error, use_and_log_error};
