//! Replay the stock metrics script against a derived pub/sub endpoint.
//!
//! Run with: cargo run --example metrics_publisher

use serde_json::Value;
use wsrelay::{Publisher, PublisherScript, metrics_script, pick_free_port, pubsub_endpoint};

struct StdoutPublisher {
    endpoint: String,
}

impl Publisher for StdoutPublisher {
    fn publish(&self, channel: &str, payload: &Value) {
        println!("{} <- {}: {}", self.endpoint, channel, payload);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let endpoint = pubsub_endpoint(pick_free_port(), false, false);
    let script = PublisherScript::new(metrics_script());
    println!("session {} publishing to {}", script.session(), endpoint);

    script.run(&StdoutPublisher { endpoint }).await;
}
