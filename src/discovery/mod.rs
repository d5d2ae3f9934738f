//! SSDP gateway discovery engine
//!
//! Components, leaves first:
//! - [`interfaces`]: usable local IPv4 addresses
//! - [`search`]: the fixed M-SEARCH request set
//! - [`listener`]: one socket, one request, one listen window
//! - [`session`]: every (address, request) pair run concurrently

pub mod error;
pub mod gateway;
pub mod interfaces;
pub mod listener;
pub mod search;
pub mod session;

pub use self::error::{DiscoveryError, DiscoveryResult};
pub use self::gateway::{gateway_channel, DiscoveredGateway, GatewayCallback, GatewayRecord};
pub use self::interfaces::{
    enumerate, list_usable_ipv4_addresses, EnumerationReport, InterfaceFlags, InterfaceInfo,
    InterfaceSource, SystemInterfaces,
};
pub use self::listener::{GatewayListener, ListenerOutcome, ListenerState, SearchTask};
pub use self::search::{build_search_messages, SearchMessage, SearchTarget};
pub use self::session::{DiscoverySession, SessionSummary};
