//! # wsrelay - Instrumented WebSocket Relay Harness
//!
//! `wsrelay` is a test harness for exercising WebSocket-based messaging
//! stacks: a broadcast relay server, process-wide traffic accounting, and a
//! scripted publisher for generating reproducible pub/sub load.
//!
//! ## Features
//!
//! - **Broadcast relay** forwarding each message to every other peer
//! - **Lock-free traffic metering** shared across all connections
//! - **Dual-mode transport resolution** for plaintext and TLS deployments
//! - **Time-paced publish scripts** for load reproduction
//! - **Silent-fallback config loading** with an opaque `apps` sub-tree
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsrelay::{AppConfig, RelayServer, TrafficMeter};
//!
//! let meter = Arc::new(TrafficMeter::new());
//! let config = AppConfig::for_relay(9001, false, false);
//! let handle = RelayServer::bind(&config, meter.clone()).await?.start();
//! ```

pub mod config;
pub mod error;
pub mod publisher;
pub mod relay;
pub mod traffic;
pub mod transport;

pub use config::{APPS_CONFIG_PATH, AppConfig, load_apps, pick_free_port};
pub use error::{Error, Result};
pub use publisher::{PublishRecord, Publisher, PublisherScript, generate_session_id, metrics_script};
pub use relay::{PeerId, PeerState, RelayEvent, RelayHandle, RelayServer};
pub use traffic::{Direction, TrafficMeter, TrafficSnapshot, TransferObserver, hex_dump};
pub use transport::{TlsOptions, http_scheme, pubsub_endpoint, ws_scheme};
