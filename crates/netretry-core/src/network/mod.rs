//! Network connectivity observation and wait-for-network retries.
//!
//! This module provides:
//! - Failure classification (connectivity vs. fatal)
//! - The connectivity observer interface and the wait-for-network procedure
//! - A push-driven connectivity monitor with optional reachability probing
//! - HTTP reachability probes
//! - The retry controller for streams and futures

mod classify;
mod connectivity;
mod monitor;
mod probe;
mod retry;

pub use classify::{ClassifyFailure, FailureKind};
pub use connectivity::{
    observe_network_availability, wait_for_network, ConnectivityEvent, ConnectivityObserver,
    DynConnectivityObserver,
};
pub use monitor::{ConnectivityMonitor, ConnectivityState, ConnectivityStatus};
pub use probe::{DynReachabilityProbe, HttpProbe, ReachabilityProbe};
pub use retry::{
    with_network_retry, NetworkRetry, NetworkRetryBuilder, RetryState, WaitingCallback,
};
