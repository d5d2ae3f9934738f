use anyhow::Result;
use clap::Parser;
use igd_finder::{init_logging, DiscoveredGateway, DiscoveryConfig, DiscoverySession};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Find UPnP Internet Gateway Devices via SSDP", long_about = None)]
struct Args {
    /// Listen window per search in milliseconds
    #[arg(long, default_value_t = igd_finder::RECEIVE_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Search only from this local IPv4 address (repeatable)
    #[arg(short, long = "interface")]
    interfaces: Vec<Ipv4Addr>,

    /// Send searches here instead of the SSDP multicast group
    #[arg(long)]
    target: Option<SocketAddrV4>,

    /// Print one JSON object per response
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config =
        DiscoveryConfig::default().with_receive_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(target) = args.target {
        config = config.with_ssdp_target(target);
    }

    let json = args.json;
    let on_found = move |gateway: DiscoveredGateway| print_gateway(&gateway, json);

    let session = if args.interfaces.is_empty() {
        DiscoverySession::start(config, on_found)?
    } else {
        DiscoverySession::start_on_addresses(config, args.interfaces, on_found)?
    };

    if !json {
        println!(
            "Searching from {} address(es) with {} listener(s)...\n",
            session.local_addresses().len(),
            session.listener_count()
        );
    }

    let summary = tokio::select! {
        summary = session.join() => summary,
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("Interrupted");
        }
    };

    if !json {
        println!(
            "\n{} response(s) in {:.1}s",
            summary.gateways_reported,
            summary.elapsed.as_secs_f64()
        );
        for failure in &summary.failures {
            println!("  failed: {}", failure);
        }
        for skipped in &summary.enumeration_errors {
            println!("  skipped: {}", skipped);
        }
        if summary.enumeration_failed() {
            anyhow::bail!("Could not enumerate network interfaces");
        }
    }

    Ok(())
}

fn print_gateway(gateway: &DiscoveredGateway, json: bool) {
    let record = gateway.record();
    if json {
        match serde_json::to_string(&record) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to encode response from {}: {}", record.responder, e),
        }
        return;
    }

    println!(
        "Gateway {} via {} ({})",
        record.responder, record.local_addr, record.search_target
    );
    for line in record.response.lines().filter(|l| !l.is_empty()) {
        println!("    {}", line);
    }
}
