/// SSDP wire constants and engine defaults

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;
pub const SSDP_TARGET: SocketAddrV4 = SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT);

// M-SEARCH header values, consumed verbatim by gateways
pub const SSDP_HOST_HEADER: &str = "239.255.255.250:1900";
pub const SSDP_MAN_HEADER: &str = "\"ssdp:discover\"";
pub const SSDP_MX_SECONDS: u8 = 2;

// Search targets
pub const ST_INTERNET_GATEWAY_DEVICE: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";
pub const ST_WAN_IP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
pub const ST_WAN_PPP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANPPPConnection:1";

// Listener parameters
pub const RECEIVE_TIMEOUT_MS: u64 = 3_000;
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(RECEIVE_TIMEOUT_MS);
pub const RECEIVE_BUFFER_SIZE: usize = 1536;

// Multicast hop limit; gateways sit one hop away
pub const MULTICAST_TTL: u32 = 2;

// Upper bound on listeners holding a socket at the same time
pub const MAX_CONCURRENT_LISTENERS: usize = 64;

// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

// Pause after a failed receive before reading the socket again
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(50);
