//! SSDP M-SEARCH request set
//!
//! The three requests are fixed at compile time and shared read-only by every
//! listener. Their bytes are consumed as-is by gateways, so the HOST, MAN and
//! MX values must stay exactly as written.

use std::fmt;

use crate::protocol::constants::{
    ST_INTERNET_GATEWAY_DEVICE, ST_WAN_IP_CONNECTION, ST_WAN_PPP_CONNECTION,
};

/// UPnP device or service type a search asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchTarget {
    /// `urn:schemas-upnp-org:device:InternetGatewayDevice:1`
    InternetGatewayDevice,
    /// `urn:schemas-upnp-org:service:WANIPConnection:1`
    WanIpConnection,
    /// `urn:schemas-upnp-org:service:WANPPPConnection:1`
    WanPppConnection,
}

impl SearchTarget {
    /// All targets, in the order requests are issued
    pub const ALL: [SearchTarget; 3] = [
        SearchTarget::InternetGatewayDevice,
        SearchTarget::WanIpConnection,
        SearchTarget::WanPppConnection,
    ];

    /// Value of the ST header
    pub fn urn(self) -> &'static str {
        match self {
            Self::InternetGatewayDevice => ST_INTERNET_GATEWAY_DEVICE,
            Self::WanIpConnection => ST_WAN_IP_CONNECTION,
            Self::WanPppConnection => ST_WAN_PPP_CONNECTION,
        }
    }

    /// Complete request text for this target
    fn request(self) -> &'static str {
        match self {
            Self::InternetGatewayDevice => concat!(
                "M-SEARCH * HTTP/1.1\r\n",
                "HOST: 239.255.255.250:1900\r\n",
                "ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n",
                "MAN: \"ssdp:discover\"\r\n",
                "MX: 2\r\n",
                "\r\n",
            ),
            Self::WanIpConnection => concat!(
                "M-SEARCH * HTTP/1.1\r\n",
                "HOST: 239.255.255.250:1900\r\n",
                "ST: urn:schemas-upnp-org:service:WANIPConnection:1\r\n",
                "MAN: \"ssdp:discover\"\r\n",
                "MX: 2\r\n",
                "\r\n",
            ),
            Self::WanPppConnection => concat!(
                "M-SEARCH * HTTP/1.1\r\n",
                "HOST: 239.255.255.250:1900\r\n",
                "ST: urn:schemas-upnp-org:service:WANPPPConnection:1\r\n",
                "MAN: \"ssdp:discover\"\r\n",
                "MX: 2\r\n",
                "\r\n",
            ),
        }
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.urn())
    }
}

/// One M-SEARCH request, ready to be sent as a single datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchMessage {
    target: SearchTarget,
    text: &'static str,
}

impl SearchMessage {
    pub fn new(target: SearchTarget) -> Self {
        Self {
            target,
            text: target.request(),
        }
    }

    pub fn target(&self) -> SearchTarget {
        self.target
    }

    pub fn as_str(&self) -> &'static str {
        self.text
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.text.as_bytes()
    }
}

/// The fixed set of search requests, one per target service type
pub fn build_search_messages() -> [SearchMessage; 3] {
    SearchTarget::ALL.map(SearchMessage::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{SSDP_HOST_HEADER, SSDP_MAN_HEADER, SSDP_MX_SECONDS};

    #[test]
    fn test_three_messages_in_target_order() {
        let messages = build_search_messages();
        let targets: Vec<_> = messages.iter().map(|m| m.target()).collect();
        assert_eq!(targets, SearchTarget::ALL.to_vec());
    }

    #[test]
    fn test_messages_are_byte_exact() {
        for message in build_search_messages() {
            let expected = format!(
                "M-SEARCH * HTTP/1.1\r\nHOST: {}\r\nST: {}\r\nMAN: {}\r\nMX: {}\r\n\r\n",
                SSDP_HOST_HEADER,
                message.target().urn(),
                SSDP_MAN_HEADER,
                SSDP_MX_SECONDS,
            );
            assert_eq!(message.as_str(), expected);
            assert_eq!(message.as_bytes(), expected.as_bytes());
        }
    }

    #[test]
    fn test_igd_request_literal() {
        let igd = SearchMessage::new(SearchTarget::InternetGatewayDevice);
        assert_eq!(
            igd.as_bytes(),
            b"M-SEARCH * HTTP/1.1\r\n\
              HOST: 239.255.255.250:1900\r\n\
              ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\
              MAN: \"ssdp:discover\"\r\n\
              MX: 2\r\n\
              \r\n"
        );
    }

    #[test]
    fn test_target_display_is_urn() {
        assert_eq!(
            SearchTarget::WanPppConnection.to_string(),
            "urn:schemas-upnp-org:service:WANPPPConnection:1"
        );
    }
}
