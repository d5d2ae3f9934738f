//! Single SSDP search: one socket, one M-SEARCH, one listen window

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::error::{DiscoveryError, DiscoveryResult};
use super::gateway::{DiscoveredGateway, GatewayCallback};
use super::search::{SearchMessage, SearchTarget};
use crate::config::DiscoveryConfig;
use crate::protocol::constants::RECEIVE_ERROR_BACKOFF;

/// One local address paired with one search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchTask {
    pub local_addr: Ipv4Addr,
    pub message: SearchMessage,
}

impl SearchTask {
    pub fn new(local_addr: Ipv4Addr, message: SearchMessage) -> Self {
        Self {
            local_addr,
            message,
        }
    }

    pub fn search_target(&self) -> SearchTarget {
        self.message.target()
    }
}

impl fmt::Display for SearchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.local_addr, self.message.target())
    }
}

/// Lifecycle of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Created = 0,
    Sending = 1,
    Listening = 2,
    Terminated = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Sending,
            2 => Self::Listening,
            _ => Self::Terminated,
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Terminated
    }
}

/// Shared, lock-free view of a listener's lifecycle
#[derive(Debug, Clone)]
pub struct ListenerStatus(Arc<AtomicU8>);

impl ListenerStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ListenerState::Created as u8)))
    }

    pub fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ListenerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Where a listener reads responses from
trait ResponseSource {
    async fn recv_response(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl ResponseSource for UdpSocket {
    async fn recv_response(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

/// Marks the listener terminated on every exit path, unwinding included
struct TerminationGuard(ListenerStatus);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.set(ListenerState::Terminated);
    }
}

/// What one listener did before terminating
#[derive(Debug)]
pub struct ListenerOutcome {
    pub task: SearchTask,
    pub gateways_reported: usize,
    pub receive_errors: usize,
    pub cancelled: bool,
    /// Socket or send failure that ended the listener early
    pub error: Option<DiscoveryError>,
}

impl ListenerOutcome {
    fn new(task: SearchTask) -> Self {
        Self {
            task,
            gateways_reported: 0,
            receive_errors: 0,
            cancelled: false,
            error: None,
        }
    }
}

/// Sends one M-SEARCH from one local address and reports every answer.
///
/// The listener waits up to `receive_timeout` for each datagram; every
/// received response restarts that window, receive errors do not. It stops
/// when the window elapses, when cancelled, or right away if the socket
/// cannot be opened or the request cannot be sent.
pub struct GatewayListener {
    task: SearchTask,
    config: Arc<DiscoveryConfig>,
    on_found: GatewayCallback,
    cancel: CancellationToken,
    pool: Option<Arc<Semaphore>>,
    status: ListenerStatus,
}

impl GatewayListener {
    pub fn new(task: SearchTask, config: Arc<DiscoveryConfig>, on_found: GatewayCallback) -> Self {
        Self {
            task,
            config,
            on_found,
            cancel: CancellationToken::new(),
            pool: None,
            status: ListenerStatus::new(),
        }
    }

    /// Stop listening once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Hold a permit from `pool` while the socket is open
    pub fn with_pool(mut self, pool: Arc<Semaphore>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn task(&self) -> SearchTask {
        self.task
    }

    pub fn status(&self) -> ListenerStatus {
        self.status.clone()
    }

    pub fn state(&self) -> ListenerState {
        self.status.get()
    }

    /// Execute the search to completion
    pub async fn run(self) -> ListenerOutcome {
        let _guard = TerminationGuard(self.status.clone());
        let mut outcome = ListenerOutcome::new(self.task);

        let _permit = match &self.pool {
            Some(pool) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        outcome.cancelled = true;
                        return outcome;
                    }
                    permit = pool.clone().acquire_owned() => permit.ok(),
                }
            }
            None => None,
        };

        if self.cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        self.status.set(ListenerState::Sending);
        let socket = match self.send_search().await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Gateway search {} aborted: {}", self.task, e);
                outcome.error = Some(e);
                return outcome;
            }
        };

        self.status.set(ListenerState::Listening);
        self.listen(&socket, &mut outcome).await;

        debug!(
            "Gateway search {} finished: {} response(s), {} receive error(s)",
            self.task, outcome.gateways_reported, outcome.receive_errors
        );
        outcome
    }

    /// Open the socket and send the request
    async fn send_search(&self) -> DiscoveryResult<UdpSocket> {
        let socket = open_socket(self.task.local_addr, &self.config)?;
        let target = self.config.ssdp_target;

        socket
            .send_to(self.task.message.as_bytes(), SocketAddr::V4(target))
            .await
            .map_err(|source| DiscoveryError::Send {
                local_addr: self.task.local_addr,
                target,
                source,
            })?;

        trace!(
            "M-SEARCH sent from {} to {}:\n{}",
            self.task.local_addr,
            target,
            self.task.message.as_str()
        );
        Ok(socket)
    }

    async fn listen<S: ResponseSource>(&self, source: &S, outcome: &mut ListenerOutcome) {
        let window = self.config.receive_timeout;
        let mut buf = vec![0u8; self.config.receive_buffer_size];
        let mut deadline = Instant::now() + window;

        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Gateway search {} cancelled", self.task);
                    outcome.cancelled = true;
                    return;
                }
                received = timeout_at(deadline, source.recv_response(&mut buf)) => received,
            };

            match received {
                // Quiet for a full window: the search is over
                Err(_) => return,
                Ok(Ok((len, from))) => {
                    deadline = Instant::now() + window;
                    debug!("Response from {} on {} ({} bytes)", from, self.task, len);

                    let gateway = DiscoveredGateway::new(
                        Bytes::copy_from_slice(&buf[..len]),
                        self.task.local_addr,
                        from,
                        self.task.search_target(),
                    );
                    (self.on_found)(gateway);
                    outcome.gateways_reported += 1;
                }
                Ok(Err(e)) => {
                    outcome.receive_errors += 1;
                    let err = DiscoveryError::Receive {
                        local_addr: self.task.local_addr,
                        source: e,
                    };
                    // Only the first failure is worth a warning
                    if outcome.receive_errors == 1 {
                        warn!("Gateway search {}: {}", self.task, err);
                    } else {
                        debug!(
                            "Gateway search {}: {} ({} so far)",
                            self.task, err, outcome.receive_errors
                        );
                    }

                    let resume = (Instant::now() + RECEIVE_ERROR_BACKOFF).min(deadline);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            outcome.cancelled = true;
                            return;
                        }
                        _ = sleep_until(resume) => {}
                    }
                    if resume >= deadline {
                        return;
                    }
                }
            }
        }
    }
}

/// UDP socket bound to `local_addr` on an ephemeral port, multicast pinned to it
fn open_socket(local_addr: Ipv4Addr, config: &DiscoveryConfig) -> DiscoveryResult<UdpSocket> {
    let bind_err = |source: io::Error| DiscoveryError::Bind { local_addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket
        .bind(&SocketAddr::V4(SocketAddrV4::new(local_addr, 0)).into())
        .map_err(bind_err)?;

    if config.ssdp_target.ip().is_multicast() {
        socket.set_multicast_if_v4(&local_addr).map_err(bind_err)?;
        socket
            .set_multicast_ttl_v4(config.multicast_ttl)
            .map_err(bind_err)?;
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    UdpSocket::from_std(socket.into()).map_err(bind_err)
}
