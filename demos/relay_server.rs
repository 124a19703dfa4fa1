//! Broadcast relay with traffic reporting.
//!
//! Run with: cargo run --example relay_server
//! Connect a few clients and watch messages fan out; Ctrl-C prints the
//! traffic report before shutting down.

use std::sync::Arc;

use wsrelay::{AppConfig, RelayServer, TrafficMeter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let meter = Arc::new(TrafficMeter::new());
    let config = AppConfig::for_relay(9001, false, false);

    let server = RelayServer::bind(&config, meter.clone()).await?;
    println!("Relay listening on {}", server.local_addr());
    let handle = server.start();

    tokio::signal::ctrl_c().await?;

    meter.report();
    handle.shutdown();
    Ok(())
}
