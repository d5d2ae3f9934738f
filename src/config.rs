use std::net::SocketAddrV4;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::discovery::error::{DiscoveryError, DiscoveryResult};
use crate::protocol::constants::{
    MAX_CONCURRENT_LISTENERS, MAX_UDP_PAYLOAD, MULTICAST_TTL, RECEIVE_BUFFER_SIZE, RECEIVE_TIMEOUT,
    SSDP_TARGET,
};

/// Discovery engine configuration
///
/// The defaults are the SSDP wire values; other destinations and timeouts
/// exist for tests and for tooling that probes a known device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Where M-SEARCH datagrams are sent
    pub ssdp_target: SocketAddrV4,
    /// How long a listener waits without receiving anything before it stops
    pub receive_timeout: Duration,
    /// Receive buffer per datagram; longer responses are truncated
    pub receive_buffer_size: usize,
    /// Listeners allowed to hold a socket at the same time
    pub max_concurrent_listeners: usize,
    /// IP_MULTICAST_TTL for outgoing searches
    pub multicast_ttl: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ssdp_target: SSDP_TARGET,
            receive_timeout: RECEIVE_TIMEOUT,
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
            max_concurrent_listeners: MAX_CONCURRENT_LISTENERS,
            multicast_ttl: MULTICAST_TTL,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_ssdp_target(mut self, target: SocketAddrV4) -> Self {
        self.ssdp_target = target;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    pub fn with_max_concurrent_listeners(mut self, max: usize) -> Self {
        self.max_concurrent_listeners = max;
        self
    }

    pub fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Reject values that would make every listener useless or that the
    /// runtime cannot honour
    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.receive_timeout.is_zero() {
            return Err(DiscoveryError::InvalidConfig(
                "receive_timeout must be greater than zero".to_string(),
            ));
        }
        if self.receive_buffer_size == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "receive_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.receive_buffer_size > MAX_UDP_PAYLOAD {
            return Err(DiscoveryError::InvalidConfig(format!(
                "receive_buffer_size {} exceeds the largest UDP payload ({})",
                self.receive_buffer_size, MAX_UDP_PAYLOAD
            )));
        }
        if self.max_concurrent_listeners == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max_concurrent_listeners must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_listeners > Semaphore::MAX_PERMITS {
            return Err(DiscoveryError::InvalidConfig(format!(
                "max_concurrent_listeners {} exceeds {}",
                self.max_concurrent_listeners,
                Semaphore::MAX_PERMITS
            )));
        }
        if self.ssdp_target.port() == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "ssdp_target port must not be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_defaults_match_wire_contract() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.ssdp_target.to_string(), "239.255.255.250:1900");
        assert_eq!(config.receive_timeout, Duration::from_millis(3000));
        assert_eq!(config.receive_buffer_size, 1536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_timeout = DiscoveryConfig::default().with_receive_timeout(Duration::ZERO);
        assert!(matches!(
            zero_timeout.validate(),
            Err(DiscoveryError::InvalidConfig(_))
        ));

        let zero_pool = DiscoveryConfig::default().with_max_concurrent_listeners(0);
        assert!(zero_pool.validate().is_err());

        let zero_buffer = DiscoveryConfig::default().with_receive_buffer_size(0);
        assert!(zero_buffer.validate().is_err());

        let zero_port = DiscoveryConfig::default()
            .with_ssdp_target(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        assert!(zero_port.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_values_beyond_runtime_limits() {
        let huge_pool = DiscoveryConfig::default().with_max_concurrent_listeners(usize::MAX);
        assert!(matches!(
            huge_pool.validate(),
            Err(DiscoveryError::InvalidConfig(_))
        ));

        let largest_pool =
            DiscoveryConfig::default().with_max_concurrent_listeners(Semaphore::MAX_PERMITS);
        assert!(largest_pool.validate().is_ok());

        let huge_buffer = DiscoveryConfig::default().with_receive_buffer_size(MAX_UDP_PAYLOAD + 1);
        assert!(huge_buffer.validate().is_err());

        let largest_buffer = DiscoveryConfig::default().with_receive_buffer_size(MAX_UDP_PAYLOAD);
        assert!(largest_buffer.validate().is_ok());
    }
}
