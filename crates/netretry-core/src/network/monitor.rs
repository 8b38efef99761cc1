//! ConnectivityMonitor - push-driven connectivity observer.
//!
//! The platform (or the application) reports network link changes with
//! [`ConnectivityMonitor::set_network_connected`]. Internet reachability is
//! either polled from a [`ReachabilityProbe`] while someone observes it, or
//! pushed manually when no probe is configured.

use crate::config::ProbeConfig;
use crate::network::connectivity::{ConnectivityEvent, ConnectivityObserver};
use crate::network::probe::{DynReachabilityProbe, HttpProbe};
use crate::Result;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Overall connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Network link up and internet reachable.
    Online = 0,
    /// No link, or the last probe failed.
    Offline = 1,
    /// A probe is in flight.
    Checking = 2,
    /// Link up but nothing is known about the internet yet.
    Unknown = 3,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::Checking => write!(f, "checking"),
            ConnectivityState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Atomic wrapper for ConnectivityState.
struct AtomicConnectivityState(AtomicU8);

impl AtomicConnectivityState {
    fn new(state: ConnectivityState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectivityState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectivityState::Online,
            1 => ConnectivityState::Offline,
            2 => ConnectivityState::Checking,
            _ => ConnectivityState::Unknown,
        }
    }

    fn store(&self, state: ConnectivityState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Snapshot of what the monitor currently knows.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityStatus {
    pub state: ConnectivityState,
    pub network_connected: bool,
    pub probing_enabled: bool,
    pub probe_interval_ms: Option<u64>,
}

/// Connectivity observer fed by platform callbacks and an optional probe.
pub struct ConnectivityMonitor {
    network_tx: watch::Sender<bool>,
    internet_tx: watch::Sender<bool>,
    probe: Option<DynReachabilityProbe>,
    probe_interval: Duration,
    /// Result of the most recent probe (or manual push).
    internet_state: Arc<AtomicConnectivityState>,
}

impl ConnectivityMonitor {
    /// Create a monitor without a probe. Internet reachability follows
    /// [`set_internet_reachable`](Self::set_internet_reachable) and starts out
    /// equal to the network state.
    pub fn new(network_connected: bool) -> Self {
        let initial = if network_connected {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        Self {
            network_tx: watch::Sender::new(network_connected),
            internet_tx: watch::Sender::new(network_connected),
            probe: None,
            probe_interval: Duration::ZERO,
            internet_state: Arc::new(AtomicConnectivityState::new(initial)),
        }
    }

    /// Create a monitor that polls `probe` every `interval` while internet
    /// reachability is being observed.
    pub fn with_probe(
        network_connected: bool,
        probe: DynReachabilityProbe,
        interval: Duration,
    ) -> Self {
        Self {
            network_tx: watch::Sender::new(network_connected),
            internet_tx: watch::Sender::new(false),
            probe: Some(probe),
            probe_interval: interval,
            internet_state: Arc::new(AtomicConnectivityState::new(ConnectivityState::Unknown)),
        }
    }

    /// Create a monitor backed by an [`HttpProbe`].
    pub fn with_http_probe(network_connected: bool, config: &ProbeConfig) -> Result<Self> {
        let probe = Arc::new(HttpProbe::with_config(config)?);
        Ok(Self::with_probe(network_connected, probe, config.interval))
    }

    /// Report a network link change.
    pub fn set_network_connected(&self, connected: bool) {
        let previous = self.network_tx.send_replace(connected);
        if previous != connected {
            if connected {
                info!("Network link up");
            } else {
                warn!("Network link lost");
            }
        }
    }

    /// Report internet reachability. Only used when no probe is configured.
    pub fn set_internet_reachable(&self, reachable: bool) {
        if self.probe.is_some() {
            debug!("Ignoring manual reachability update: a probe is configured");
            return;
        }
        self.internet_tx.send_replace(reachable);
        self.internet_state.store(if reachable {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        });
    }

    /// Whether the network link is currently up.
    pub fn is_network_connected(&self) -> bool {
        *self.network_tx.borrow()
    }

    /// Number of live network-link subscriptions.
    pub fn network_subscribers(&self) -> usize {
        self.network_tx.receiver_count()
    }

    /// Current connectivity state.
    pub fn connectivity(&self) -> ConnectivityState {
        if !self.is_network_connected() {
            return ConnectivityState::Offline;
        }
        self.internet_state.load()
    }

    /// Get connectivity status summary.
    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            state: self.connectivity(),
            network_connected: self.is_network_connected(),
            probing_enabled: self.probe.is_some(),
            probe_interval_ms: self
                .probe
                .as_ref()
                .map(|_| self.probe_interval.as_millis() as u64),
        }
    }

    fn probe_stream(&self, probe: DynReachabilityProbe) -> BoxStream<'static, ConnectivityEvent> {
        let interval = self.probe_interval;
        let state = Arc::clone(&self.internet_state);

        // Probe immediately, then every `interval`; only changes are emitted.
        stream::unfold(
            (probe, state, None::<bool>),
            move |(probe, state, last)| async move {
                let mut last = last;
                loop {
                    if last.is_some() {
                        tokio::time::sleep(interval).await;
                    }

                    state.store(ConnectivityState::Checking);
                    let reachable = probe.probe().await;
                    state.store(if reachable {
                        ConnectivityState::Online
                    } else {
                        ConnectivityState::Offline
                    });

                    if last != Some(reachable) {
                        debug!(reachable, "Internet reachability changed");
                        let event = ConnectivityEvent::from_reachable(reachable);
                        return Some((event, (probe, state, Some(reachable))));
                    }
                    last = Some(reachable);
                }
            },
        )
        .boxed()
    }
}

/// Emit the current value of a watch channel, then every change.
fn watch_stream<T, F>(rx: watch::Receiver<T>, map: F) -> BoxStream<'static, ConnectivityEvent>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> ConnectivityEvent + Send + Sync + 'static,
{
    let map = Arc::new(map);
    stream::unfold((rx, true), move |(mut rx, first)| {
        let map = Arc::clone(&map);
        async move {
            if !first {
                // Sender dropped: the monitor is gone
                rx.changed().await.ok()?;
            }
            let value = rx.borrow_and_update().clone();
            Some(((*map)(value), (rx, false)))
        }
    })
    .boxed()
}

impl ConnectivityObserver for ConnectivityMonitor {
    fn observe_network(&self) -> BoxStream<'static, ConnectivityEvent> {
        watch_stream(self.network_tx.subscribe(), ConnectivityEvent::from_connected)
    }

    fn observe_internet(&self) -> BoxStream<'static, ConnectivityEvent> {
        match &self.probe {
            Some(probe) => self.probe_stream(Arc::clone(probe)),
            None => watch_stream(self.internet_tx.subscribe(), ConnectivityEvent::from_reachable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::probe::ReachabilityProbe;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Probe returning a fixed script of results, then repeating the last.
    struct ScriptedProbe {
        results: Vec<bool>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReachabilityProbe for ScriptedProbe {
        async fn probe(&self) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = call.min(self.results.len() - 1);
            self.results[idx]
        }
    }

    #[tokio::test]
    async fn test_network_stream_yields_current_then_changes() {
        let monitor = ConnectivityMonitor::new(false);
        let mut events = monitor.observe_network();

        assert_eq!(events.next().await, Some(ConnectivityEvent::Disconnected));

        monitor.set_network_connected(true);
        assert_eq!(events.next().await, Some(ConnectivityEvent::Connected));
        assert!(monitor.is_network_connected());
    }

    #[tokio::test]
    async fn test_manual_internet_updates() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.observe_internet();
        assert_eq!(events.next().await, Some(ConnectivityEvent::InternetReachable));

        monitor.set_internet_reachable(false);
        assert_eq!(events.next().await, Some(ConnectivityEvent::InternetUnreachable));
        assert_eq!(monitor.connectivity(), ConnectivityState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_stream_emits_changes_only() {
        let probe = Arc::new(ScriptedProbe {
            results: vec![false, false, true],
            calls: AtomicUsize::new(0),
        });
        let monitor =
            ConnectivityMonitor::with_probe(true, probe.clone(), Duration::from_secs(2));
        assert_eq!(monitor.connectivity(), ConnectivityState::Unknown);

        let mut events = monitor.observe_internet();
        assert_eq!(events.next().await, Some(ConnectivityEvent::InternetUnreachable));
        assert_eq!(events.next().await, Some(ConnectivityEvent::InternetReachable));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(monitor.connectivity(), ConnectivityState::Online);
    }

    /// Probe that blocks until released, signalling when it starts.
    struct GatedProbe {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ReachabilityProbe for GatedProbe {
        async fn probe(&self) -> bool {
            self.started.notify_one();
            self.release.notified().await;
            true
        }
    }

    #[tokio::test]
    async fn test_checking_while_reachability_check_in_flight() {
        let probe = Arc::new(GatedProbe {
            started: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let monitor = ConnectivityMonitor::with_probe(true, probe.clone(), Duration::from_secs(2));

        let mut events = monitor.observe_internet();
        let first = tokio::spawn(async move { events.next().await });

        probe.started.notified().await;
        assert_eq!(monitor.connectivity(), ConnectivityState::Checking);
        assert_eq!(monitor.status().state, ConnectivityState::Checking);

        probe.release.notify_one();
        assert_eq!(first.await.unwrap(), Some(ConnectivityEvent::InternetReachable));
        assert_eq!(monitor.connectivity(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_manual_push_ignored_with_probe() {
        let probe = Arc::new(ScriptedProbe {
            results: vec![true],
            calls: AtomicUsize::new(0),
        });
        let monitor = ConnectivityMonitor::with_probe(true, probe, Duration::from_secs(1));
        monitor.set_internet_reachable(true);
        assert_eq!(monitor.connectivity(), ConnectivityState::Unknown);
    }

    #[test]
    fn test_status_offline_without_link() {
        let monitor = ConnectivityMonitor::new(false);
        let status = monitor.status();
        assert_eq!(status.state, ConnectivityState::Offline);
        assert!(!status.network_connected);
        assert!(!status.probing_enabled);
        assert!(status.probe_interval_ms.is_none());
    }
}
