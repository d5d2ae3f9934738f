use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Failures observed during a discovery run.
///
/// None of these abort a session: each one is logged where it happens, the
/// affected interface or listener is dropped, and the value is kept for the
/// [`SessionSummary`](super::session::SessionSummary).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The platform refused to list its network interfaces at all
    #[error("Failed to enumerate network interfaces: {0}")]
    Enumeration(#[source] io::Error),

    /// One interface could not be inspected; the others are still used
    #[error("Failed to inspect interface {interface}: {source}")]
    InterfaceInspection {
        interface: String,
        #[source]
        source: io::Error,
    },

    /// Listener could not open its socket
    #[error("Failed to bind UDP socket on {local_addr}: {source}")]
    Bind {
        local_addr: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// Listener could not send its M-SEARCH
    #[error("Failed to send M-SEARCH from {local_addr} to {target}: {source}")]
    Send {
        local_addr: Ipv4Addr,
        target: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    /// Transient receive failure inside a listener loop
    #[error("Receive error on {local_addr}: {source}")]
    Receive {
        local_addr: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// Listener task ended without producing an outcome (panic or runtime shutdown)
    #[error("Listener on {local_addr} for {search_target} aborted: {reason}")]
    ListenerAborted {
        local_addr: Ipv4Addr,
        search_target: String,
        reason: String,
    },

    /// Configuration rejected before any listener was started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DiscoveryError {
    /// Local address the failure is tied to, if any
    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Bind { local_addr, .. }
            | Self::Send { local_addr, .. }
            | Self::Receive { local_addr, .. }
            | Self::ListenerAborted { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// Errors that stopped enumeration of an interface or of all interfaces
    pub fn is_enumeration_error(&self) -> bool {
        matches!(self, Self::Enumeration(_) | Self::InterfaceInspection { .. })
    }
}

/// Result type for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_address() {
        let err = DiscoveryError::Send {
            local_addr: Ipv4Addr::new(192, 168, 1, 5),
            target: crate::protocol::constants::SSDP_TARGET,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("192.168.1.5"));
        assert!(msg.contains("239.255.255.250:1900"));
        assert_eq!(err.local_addr(), Some(Ipv4Addr::new(192, 168, 1, 5)));
        assert!(!err.is_enumeration_error());
    }

    #[test]
    fn test_enumeration_errors_have_no_address() {
        let err = DiscoveryError::InterfaceInspection {
            interface: "eth1".to_string(),
            source: io::Error::new(io::ErrorKind::Other, "gone"),
        };
        assert!(err.is_enumeration_error());
        assert_eq!(err.local_addr(), None);
    }
}
