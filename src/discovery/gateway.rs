use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::search::SearchTarget;

/// One SSDP response received by a listener.
///
/// The payload is kept raw; turning it into a device descriptor is left to
/// the caller. A gateway answering several search targets shows up once per
/// answer.
#[derive(Debug, Clone)]
pub struct DiscoveredGateway {
    response: Bytes,
    local_addr: Ipv4Addr,
    responder: SocketAddr,
    search_target: SearchTarget,
    received_at: DateTime<Utc>,
}

impl DiscoveredGateway {
    pub fn new(
        response: Bytes,
        local_addr: Ipv4Addr,
        responder: SocketAddr,
        search_target: SearchTarget,
    ) -> Self {
        Self {
            response,
            local_addr,
            responder,
            search_target,
            received_at: Utc::now(),
        }
    }

    /// Raw datagram payload, exactly as received
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Local address the response arrived on
    pub fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    /// Address the response was sent from
    pub fn responder(&self) -> SocketAddr {
        self.responder
    }

    /// Search that produced this response
    pub fn search_target(&self) -> SearchTarget {
        self.search_target
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Payload and local address, for handing to a descriptor parser
    pub fn into_parts(self) -> (Bytes, Ipv4Addr) {
        (self.response, self.local_addr)
    }

    /// Serializable snapshot with the payload decoded lossily as text
    pub fn record(&self) -> GatewayRecord {
        GatewayRecord {
            local_addr: self.local_addr,
            responder: self.responder,
            search_target: self.search_target.urn(),
            received_at: self.received_at,
            response: String::from_utf8_lossy(&self.response).into_owned(),
        }
    }
}

/// Flat view of a [`DiscoveredGateway`] for logs and JSON output
#[derive(Debug, Clone, Serialize)]
pub struct GatewayRecord {
    pub local_addr: Ipv4Addr,
    pub responder: SocketAddr,
    pub search_target: &'static str,
    pub received_at: DateTime<Utc>,
    pub response: String,
}

/// Callback invoked once per received response, possibly from several tasks at once
pub type GatewayCallback = Arc<dyn Fn(DiscoveredGateway) + Send + Sync>;

/// Callback that forwards every gateway into an unbounded channel.
///
/// The receiver sees `None` once the callback and all its clones are dropped,
/// i.e. once every listener holding it has terminated.
pub fn gateway_channel() -> (
    impl Fn(DiscoveredGateway) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<DiscoveredGateway>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let forward = move |gateway: DiscoveredGateway| {
        // Receiver gone means the caller stopped caring
        let _ = tx.send(gateway);
    };
    (forward, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_payload_and_addresses() {
        let gateway = DiscoveredGateway::new(
            Bytes::from_static(b"HTTP/1.1 200 OK\r\n\r\n"),
            Ipv4Addr::new(192, 168, 1, 5),
            "192.168.1.1:1900".parse().unwrap(),
            SearchTarget::InternetGatewayDevice,
        );

        let record = gateway.record();
        assert_eq!(record.local_addr, Ipv4Addr::new(192, 168, 1, 5));
        assert_eq!(record.response, "HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(
            record.search_target,
            "urn:schemas-upnp-org:device:InternetGatewayDevice:1"
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["responder"], "192.168.1.1:1900");

        let (payload, local) = gateway.into_parts();
        assert_eq!(&payload[..], b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(local, Ipv4Addr::new(192, 168, 1, 5));
    }

    #[tokio::test]
    async fn test_channel_closes_when_callback_dropped() {
        let (forward, mut rx) = gateway_channel();
        forward(DiscoveredGateway::new(
            Bytes::from_static(b"one"),
            Ipv4Addr::new(10, 0, 0, 2),
            "10.0.0.1:1900".parse().unwrap(),
            SearchTarget::WanIpConnection,
        ));
        drop(forward);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.response(), b"one");
        assert!(rx.recv().await.is_none());
    }
}
