//! Connectivity observation and the "wait for network" sub-procedure.
//!
//! The retry controller never reads platform state directly. It is handed an
//! `Arc<dyn ConnectivityObserver>` and only consumes the events it emits.

use crate::error::{NetRetryError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A change in network or internet availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    /// The device has a network link.
    Connected,
    /// The device has no network link.
    Disconnected,
    /// A reachability probe succeeded.
    InternetReachable,
    /// A reachability probe failed.
    InternetUnreachable,
}

impl ConnectivityEvent {
    /// Whether this event means the relevant layer is usable.
    pub fn is_available(self) -> bool {
        matches!(
            self,
            ConnectivityEvent::Connected | ConnectivityEvent::InternetReachable
        )
    }

    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            ConnectivityEvent::InternetReachable
        } else {
            ConnectivityEvent::InternetUnreachable
        }
    }

    pub fn from_connected(connected: bool) -> Self {
        if connected {
            ConnectivityEvent::Connected
        } else {
            ConnectivityEvent::Disconnected
        }
    }
}

impl std::fmt::Display for ConnectivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityEvent::Connected => write!(f, "connected"),
            ConnectivityEvent::Disconnected => write!(f, "disconnected"),
            ConnectivityEvent::InternetReachable => write!(f, "internet reachable"),
            ConnectivityEvent::InternetUnreachable => write!(f, "internet unreachable"),
        }
    }
}

/// Source of connectivity signals.
///
/// Both streams are expected to be long-lived: they emit the current state
/// first and then every change. Dropping a stream must stop whatever work
/// backs it.
pub trait ConnectivityObserver: Send + Sync {
    /// Network link events (`Connected` / `Disconnected`).
    fn observe_network(&self) -> BoxStream<'static, ConnectivityEvent>;

    /// Internet reachability events (`InternetReachable` /
    /// `InternetUnreachable`).
    fn observe_internet(&self) -> BoxStream<'static, ConnectivityEvent>;
}

/// Shared handle to a connectivity observer.
pub type DynConnectivityObserver = Arc<dyn ConnectivityObserver>;

/// Resolve once the network is usable.
///
/// Waits for the first `Connected` event and, when `check_internet` is set,
/// then for the first `InternetReachable`. Fails with
/// [`NetRetryError::ConnectivityUnavailable`] if a stream ends first.
pub async fn wait_for_network(
    observer: &dyn ConnectivityObserver,
    check_internet: bool,
) -> Result<()> {
    first_available(observer.observe_network(), "Waiting for network...").await?;

    if check_internet {
        first_available(observer.observe_internet(), "Waiting for connectivity...").await?;
    }

    debug!("Network is back");
    Ok(())
}

async fn first_available(
    mut events: BoxStream<'static, ConnectivityEvent>,
    waiting_message: &str,
) -> Result<()> {
    while let Some(event) = events.next().await {
        if event.is_available() {
            return Ok(());
        }
        debug!(event = %event, "{}", waiting_message);
    }
    Err(NetRetryError::ConnectivityUnavailable)
}

/// Stream of availability flags.
///
/// Without `check_internet` this mirrors the network link. With it, every
/// `Connected` starts following internet reachability; losing the link after
/// that emits `false` and stops following it until the link returns. Link
/// events seen before any `Connected` emit nothing.
pub fn observe_network_availability(
    observer: DynConnectivityObserver,
    check_internet: bool,
) -> BoxStream<'static, bool> {
    let network = observer.observe_network();
    if !check_internet {
        return network.map(|event| event.is_available()).boxed();
    }

    struct State {
        observer: DynConnectivityObserver,
        network: BoxStream<'static, ConnectivityEvent>,
        internet: Option<BoxStream<'static, ConnectivityEvent>>,
    }

    enum Next {
        Network(Option<ConnectivityEvent>),
        Internet(Option<ConnectivityEvent>),
    }

    let state = State {
        observer,
        network,
        internet: None,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let next = match state.internet.as_mut() {
                Some(internet) => tokio::select! {
                    biased;
                    event = internet.next() => Next::Internet(event),
                    event = state.network.next() => Next::Network(event),
                },
                None => Next::Network(state.network.next().await),
            };

            match next {
                Next::Network(None) => return None,
                Next::Network(Some(event)) if event.is_available() => {
                    state.internet = Some(state.observer.observe_internet());
                }
                Next::Network(Some(_)) => {
                    let was_following = state.internet.take().is_some();
                    if was_following {
                        return Some((false, state));
                    }
                }
                Next::Internet(Some(event)) => return Some((event.is_available(), state)),
                Next::Internet(None) => {
                    state.internet = None;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Observer replaying fixed event sequences.
    struct Scripted {
        network: Vec<ConnectivityEvent>,
        internet: Vec<ConnectivityEvent>,
        internet_subscriptions: AtomicUsize,
    }

    impl Scripted {
        fn new(network: Vec<ConnectivityEvent>, internet: Vec<ConnectivityEvent>) -> Self {
            Self {
                network,
                internet,
                internet_subscriptions: AtomicUsize::new(0),
            }
        }
    }

    impl ConnectivityObserver for Scripted {
        fn observe_network(&self) -> BoxStream<'static, ConnectivityEvent> {
            stream::iter(self.network.clone()).boxed()
        }

        fn observe_internet(&self) -> BoxStream<'static, ConnectivityEvent> {
            self.internet_subscriptions.fetch_add(1, Ordering::SeqCst);
            stream::iter(self.internet.clone()).boxed()
        }
    }

    use ConnectivityEvent::*;

    #[tokio::test]
    async fn test_wait_skips_until_connected() {
        let observer = Scripted::new(
            vec![Disconnected, Disconnected, Connected],
            vec![InternetUnreachable, InternetReachable],
        );
        assert!(wait_for_network(&observer, true).await.is_ok());
        assert_eq!(observer.internet_subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_without_internet_check_never_probes() {
        let observer = Scripted::new(vec![Connected], vec![]);
        assert!(wait_for_network(&observer, false).await.is_ok());
        assert_eq!(observer.internet_subscriptions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_fails_when_network_stream_ends() {
        let observer = Scripted::new(vec![Disconnected], vec![InternetReachable]);
        let err = wait_for_network(&observer, true).await.unwrap_err();
        assert!(matches!(err, NetRetryError::ConnectivityUnavailable));
    }

    #[tokio::test]
    async fn test_wait_fails_when_internet_never_reachable() {
        let observer = Scripted::new(vec![Connected], vec![InternetUnreachable]);
        let err = wait_for_network(&observer, true).await.unwrap_err();
        assert!(matches!(err, NetRetryError::ConnectivityUnavailable));
    }

    #[tokio::test]
    async fn test_availability_mirrors_network_without_check() {
        let observer: DynConnectivityObserver = Arc::new(Scripted::new(
            vec![Disconnected, Connected, Disconnected],
            vec![],
        ));
        let flags: Vec<bool> = observe_network_availability(observer, false)
            .collect()
            .await;
        assert_eq!(flags, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_availability_follows_internet_after_connect() {
        let observer: DynConnectivityObserver = Arc::new(Scripted::new(
            vec![Disconnected, Connected],
            vec![InternetUnreachable, InternetReachable],
        ));
        let flags: Vec<bool> = observe_network_availability(observer, true)
            .collect()
            .await;
        assert_eq!(flags, vec![false, true]);
    }

    /// Live monitor that counts internet subscriptions.
    struct CountingMonitor {
        monitor: crate::network::monitor::ConnectivityMonitor,
        internet_subscriptions: AtomicUsize,
    }

    impl ConnectivityObserver for CountingMonitor {
        fn observe_network(&self) -> BoxStream<'static, ConnectivityEvent> {
            self.monitor.observe_network()
        }

        fn observe_internet(&self) -> BoxStream<'static, ConnectivityEvent> {
            self.internet_subscriptions.fetch_add(1, Ordering::SeqCst);
            self.monitor.observe_internet()
        }
    }

    #[tokio::test]
    async fn test_availability_tracks_link_loss_and_reconnect() {
        let observer = Arc::new(CountingMonitor {
            monitor: crate::network::monitor::ConnectivityMonitor::new(true),
            internet_subscriptions: AtomicUsize::new(0),
        });
        let mut flags = observe_network_availability(observer.clone(), true);

        assert_eq!(flags.next().await, Some(true));
        assert_eq!(observer.internet_subscriptions.load(Ordering::SeqCst), 1);

        observer.monitor.set_network_connected(false);
        assert_eq!(flags.next().await, Some(false));

        observer.monitor.set_network_connected(true);
        assert_eq!(flags.next().await, Some(true));
        assert_eq!(observer.internet_subscriptions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_availability_reports_internet_changes_while_connected() {
        let observer = Arc::new(CountingMonitor {
            monitor: crate::network::monitor::ConnectivityMonitor::new(true),
            internet_subscriptions: AtomicUsize::new(0),
        });
        let mut flags = observe_network_availability(observer.clone(), true);
        assert_eq!(flags.next().await, Some(true));

        observer.monitor.set_internet_reachable(false);
        assert_eq!(flags.next().await, Some(false));
        observer.monitor.set_internet_reachable(true);
        assert_eq!(flags.next().await, Some(true));
        assert_eq!(observer.internet_subscriptions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let json = serde_json::to_string(&InternetReachable).unwrap();
        assert_eq!(json, "\"internet_reachable\"");
    }
}
