//! IGD Finder Library (lib.rs)
//!
//! Locates UPnP Internet Gateway Devices by sending SSDP M-SEARCH requests
//! from every usable local IPv4 address and collecting the unicast answers.
//! What to do with a gateway once found (descriptor fetch, SOAP port
//! mapping) is up to the caller.
//!
//! ```no_run
//! use igd_finder::{DiscoveryConfig, DiscoverySession};
//!
//! # async fn run() -> igd_finder::DiscoveryResult<()> {
//! let session = DiscoverySession::start(DiscoveryConfig::default(), |gateway| {
//!     println!("{} answered on {}", gateway.responder(), gateway.local_addr());
//! })?;
//! let summary = session.join().await;
//! println!("{} response(s)", summary.gateways_reported);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod protocol;

// Re-export main types
pub use config::DiscoveryConfig;
pub use discovery::{
    build_search_messages, gateway_channel, list_usable_ipv4_addresses, DiscoveredGateway,
    DiscoveryError, DiscoveryResult, DiscoverySession, GatewayCallback, SearchMessage,
    SearchTarget, SessionSummary,
};
pub use protocol::constants::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging system
///
/// `RUST_LOG` takes precedence; otherwise `level` is used
/// (trace/debug/info/warn/error).
///
/// # Example
/// ```
/// igd_finder::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Reduce verbosity of the runtime
    for directive in ["tokio=warn", "runtime=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(true),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
    }
}
