//! One discovery run across every usable interface and search target

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::{DiscoveryError, DiscoveryResult};
use super::gateway::{gateway_channel, DiscoveredGateway, GatewayCallback};
use super::interfaces::{enumerate, InterfaceSource, SystemInterfaces};
use super::listener::{GatewayListener, ListenerOutcome, ListenerState, ListenerStatus, SearchTask};
use super::search::build_search_messages;
use crate::config::DiscoveryConfig;

struct ListenerEntry {
    task: SearchTask,
    status: ListenerStatus,
}

/// A running gateway discovery.
///
/// Construction starts one listener per (local address, search message) pair
/// right away. Listeners run independently until their listen window
/// elapses; the callback is invoked from whichever listener received a
/// response, so it may run concurrently with itself.
///
/// Dropping the session does not stop the listeners; call [`cancel`] for that.
///
/// [`cancel`]: DiscoverySession::cancel
pub struct DiscoverySession {
    listeners: Vec<ListenerEntry>,
    handles: Vec<JoinHandle<ListenerOutcome>>,
    cancel: CancellationToken,
    enumeration_errors: Vec<DiscoveryError>,
    started_at: Instant,
}

impl DiscoverySession {
    /// Discover on every usable interface of this host.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<F>(config: DiscoveryConfig, on_found: F) -> DiscoveryResult<Self>
    where
        F: Fn(DiscoveredGateway) + Send + Sync + 'static,
    {
        Self::start_with_source(config, &SystemInterfaces, on_found)
    }

    /// Discover on the usable interfaces reported by `source`
    pub fn start_with_source<F>(
        config: DiscoveryConfig,
        source: &dyn InterfaceSource,
        on_found: F,
    ) -> DiscoveryResult<Self>
    where
        F: Fn(DiscoveredGateway) + Send + Sync + 'static,
    {
        config.validate()?;
        let report = enumerate(source);
        if report.addresses.is_empty() {
            warn!("No usable IPv4 interface found, gateway discovery has nothing to do");
        }
        Self::spawn_all(config, report.addresses, report.errors, Arc::new(on_found))
    }

    /// Discover from a fixed set of local addresses, skipping enumeration
    pub fn start_on_addresses<F>(
        config: DiscoveryConfig,
        addresses: Vec<Ipv4Addr>,
        on_found: F,
    ) -> DiscoveryResult<Self>
    where
        F: Fn(DiscoveredGateway) + Send + Sync + 'static,
    {
        config.validate()?;
        Self::spawn_all(config, addresses, Vec::new(), Arc::new(on_found))
    }

    /// Discover on this host's interfaces, delivering gateways through a channel.
    ///
    /// The receiver yields `None` once every listener has terminated.
    pub fn channel(
        config: DiscoveryConfig,
    ) -> DiscoveryResult<(Self, mpsc::UnboundedReceiver<DiscoveredGateway>)> {
        Self::channel_with_source(config, &SystemInterfaces)
    }

    /// Channel delivery over the usable interfaces reported by `source`
    pub fn channel_with_source(
        config: DiscoveryConfig,
        source: &dyn InterfaceSource,
    ) -> DiscoveryResult<(Self, mpsc::UnboundedReceiver<DiscoveredGateway>)> {
        let (forward, rx) = gateway_channel();
        let session = Self::start_with_source(config, source, forward)?;
        Ok((session, rx))
    }

    fn spawn_all(
        config: DiscoveryConfig,
        addresses: Vec<Ipv4Addr>,
        enumeration_errors: Vec<DiscoveryError>,
        on_found: GatewayCallback,
    ) -> DiscoveryResult<Self> {
        let messages = build_search_messages();
        let pool = Arc::new(Semaphore::new(config.max_concurrent_listeners));
        let config = Arc::new(config);
        let cancel = CancellationToken::new();

        let capacity = addresses.len() * messages.len();
        let mut listeners = Vec::with_capacity(capacity);
        let mut handles = Vec::with_capacity(capacity);

        info!(
            "Starting gateway discovery: {} address(es) x {} search target(s) towards {}",
            addresses.len(),
            messages.len(),
            config.ssdp_target
        );

        for local_addr in addresses {
            for message in messages {
                let task = SearchTask::new(local_addr, message);
                let listener = GatewayListener::new(task, config.clone(), on_found.clone())
                    .with_pool(pool.clone())
                    .with_cancellation(cancel.child_token());

                listeners.push(ListenerEntry {
                    task,
                    status: listener.status(),
                });
                handles.push(tokio::spawn(listener.run()));
            }
        }

        Ok(Self {
            listeners,
            handles,
            cancel,
            enumeration_errors,
            started_at: Instant::now(),
        })
    }

    /// True while at least one listener has not terminated
    pub fn is_searching(&self) -> bool {
        self.listeners.iter().any(|l| l.status.get().is_active())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Every search task of this run, in spawn order
    pub fn tasks(&self) -> impl Iterator<Item = SearchTask> + '_ {
        self.listeners.iter().map(|l| l.task)
    }

    /// Current lifecycle state of each listener
    pub fn listener_states(&self) -> Vec<(SearchTask, ListenerState)> {
        self.listeners
            .iter()
            .map(|l| (l.task, l.status.get()))
            .collect()
    }

    /// Local addresses searched from, without repeats
    pub fn local_addresses(&self) -> Vec<Ipv4Addr> {
        let mut addrs: Vec<Ipv4Addr> = Vec::new();
        for task in self.tasks() {
            if !addrs.contains(&task.local_addr) {
                addrs.push(task.local_addr);
            }
        }
        addrs
    }

    /// Interfaces skipped while building the address list
    pub fn enumeration_errors(&self) -> &[DiscoveryError] {
        &self.enumeration_errors
    }

    /// Stop all listeners; responses already reported stay reported
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every listener and collect what happened
    pub async fn join(self) -> SessionSummary {
        let mut summary = SessionSummary {
            listeners: self.listeners.len(),
            gateways_reported: 0,
            receive_errors: 0,
            cancelled_listeners: 0,
            failures: Vec::new(),
            enumeration_errors: self.enumeration_errors,
            elapsed: Duration::ZERO,
        };

        for (entry, handle) in self.listeners.iter().zip(self.handles) {
            match handle.await {
                Ok(outcome) => {
                    summary.gateways_reported += outcome.gateways_reported;
                    summary.receive_errors += outcome.receive_errors;
                    if outcome.cancelled {
                        summary.cancelled_listeners += 1;
                    }
                    if let Some(err) = outcome.error {
                        summary.failures.push(err);
                    }
                }
                Err(e) => {
                    warn!("Gateway search {} aborted: {}", entry.task, e);
                    summary.failures.push(DiscoveryError::ListenerAborted {
                        local_addr: entry.task.local_addr,
                        search_target: entry.task.search_target().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.elapsed = self.started_at.elapsed();
        info!(
            "Gateway discovery finished in {:?}: {} response(s) from {} listener(s), {} failed",
            summary.elapsed,
            summary.gateways_reported,
            summary.listeners,
            summary.failures.len()
        );
        summary
    }
}

/// Totals for a finished discovery run
#[derive(Debug)]
pub struct SessionSummary {
    pub listeners: usize,
    pub gateways_reported: usize,
    pub receive_errors: usize,
    pub cancelled_listeners: usize,
    /// Listeners that could not search (socket, send or task failures)
    pub failures: Vec<DiscoveryError>,
    pub enumeration_errors: Vec<DiscoveryError>,
    pub elapsed: Duration,
}

impl SessionSummary {
    pub fn found_any(&self) -> bool {
        self.gateways_reported > 0
    }

    /// Nothing could be searched because the interface list was unreadable
    pub fn enumeration_failed(&self) -> bool {
        self.listeners == 0
            && self
                .enumeration_errors
                .iter()
                .any(|e| matches!(e, DiscoveryError::Enumeration(_)))
    }

    /// Every listener failed before it could listen
    pub fn all_listeners_failed(&self) -> bool {
        self.listeners > 0 && self.failures.len() == self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::interfaces::{InterfaceFlags, InterfaceInfo};
    use crate::discovery::search::SearchTarget;
    use std::io;
    use std::net::SocketAddrV4;

    fn unreachable_addresses() -> Vec<Ipv4Addr> {
        // TEST-NET-1, never assigned locally: every bind fails
        vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)]
    }

    fn quick_config() -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_ssdp_target(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9))
            .with_receive_timeout(Duration::from_millis(200))
    }

    struct StaticInterfaces;

    impl InterfaceSource for StaticInterfaces {
        fn interface_names(&self) -> io::Result<Vec<String>> {
            Ok(vec!["eth0".into(), "eth1".into(), "eth2".into()])
        }

        fn inspect(&self, name: &str) -> io::Result<InterfaceInfo> {
            let addr = match name {
                "eth0" => "192.0.2.10",
                "eth2" => "192.0.2.12",
                _ => return Err(io::Error::new(io::ErrorKind::Other, "unreadable")),
            };
            Ok(InterfaceInfo {
                name: name.to_string(),
                flags: InterfaceFlags {
                    up: true,
                    ..InterfaceFlags::default()
                },
                addresses: vec![addr.parse().unwrap()],
            })
        }
    }

    #[tokio::test]
    async fn test_listener_count_is_addresses_times_messages() {
        let session =
            DiscoverySession::start_on_addresses(quick_config(), unreachable_addresses(), |_| {})
                .unwrap();

        assert_eq!(session.listener_count(), 6);
        assert_eq!(session.local_addresses(), unreachable_addresses());

        let igd_searches = session
            .tasks()
            .filter(|t| t.search_target() == SearchTarget::InternetGatewayDevice)
            .count();
        assert_eq!(igd_searches, 2);

        let summary = session.join().await;
        assert_eq!(summary.listeners, 6);
        assert_eq!(summary.failures.len(), 6);
        assert!(summary.all_listeners_failed());
        assert!(!summary.found_any());
    }

    #[tokio::test]
    async fn test_liveness_goes_false_and_stays_false() {
        let session =
            DiscoverySession::start_on_addresses(quick_config(), unreachable_addresses(), |_| {})
                .unwrap();
        assert!(session.is_searching());

        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_searching() {
            assert!(Instant::now() < deadline, "listeners never terminated");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!session.is_searching());
        }
        assert!(session
            .listener_states()
            .iter()
            .all(|(_, state)| *state == ListenerState::Terminated));
    }

    #[tokio::test]
    async fn test_no_addresses_means_no_listeners() {
        let session =
            DiscoverySession::start_on_addresses(quick_config(), Vec::new(), |_| {}).unwrap();
        assert_eq!(session.listener_count(), 0);
        assert!(!session.is_searching());

        let summary = session.join().await;
        assert_eq!(summary.listeners, 0);
        assert!(!summary.enumeration_failed());
    }

    #[tokio::test]
    async fn test_enumeration_failures_are_kept_and_skipped() {
        let session =
            DiscoverySession::start_with_source(quick_config(), &StaticInterfaces, |_| {}).unwrap();

        assert_eq!(session.listener_count(), 6);
        assert_eq!(session.enumeration_errors().len(), 1);
        assert_eq!(
            session.local_addresses(),
            vec![Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::new(192, 0, 2, 12)]
        );

        let summary = session.join().await;
        assert_eq!(summary.enumeration_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = quick_config().with_receive_timeout(Duration::ZERO);
        let result = DiscoverySession::start_on_addresses(config, unreachable_addresses(), |_| {});
        assert!(matches!(result, Err(DiscoveryError::InvalidConfig(_))));

        let config = quick_config().with_max_concurrent_listeners(usize::MAX);
        let result = DiscoverySession::start_on_addresses(config, unreachable_addresses(), |_| {});
        assert!(matches!(result, Err(DiscoveryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_channel_closes_after_last_listener() {
        let (session, mut rx) =
            DiscoverySession::channel_with_source(quick_config(), &StaticInterfaces).unwrap();
        assert_eq!(session.listener_count(), 6);

        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("channel still open after every listener failed");
        assert!(closed.is_none());
        assert!(!session.is_searching());
    }
}
