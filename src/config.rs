//! Server configuration assembly and the JSON apps descriptor loader.
//!
//! Everything except the `apps` sub-tree comes from caller-supplied
//! defaults; the descriptor file only ever contributes `apps`, and a
//! missing or unreadable file is a supported silent fallback rather than an
//! error.

use std::net::TcpListener;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::transport::TlsOptions;

/// Fixed relative path of the apps descriptor.
pub const APPS_CONFIG_PATH: &str = "appsConfig.json";

/// Pub/sub port used when ephemeral allocation fails.
const FALLBACK_PUBSUB_PORT: u16 = 9901;

/// Configuration record consumed by the relay at startup.
///
/// Built once; not mutated after the server begins listening.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the relay listens on. Zero asks the OS for an ephemeral port.
    pub port: u16,
    /// Hostname the relay binds.
    pub hostname: String,
    /// Verbose logging flag.
    pub verbose: bool,
    /// Pub/sub hosts. Only the first entry is honored.
    pub pubsub_hosts: Vec<String>,
    /// Pub/sub port.
    pub pubsub_port: u16,
    /// Pub/sub auth password.
    pub pubsub_password: String,
    /// Transport material for the server role.
    pub tls: TlsOptions,
    /// Opaque application sub-tree merged from the descriptor file.
    ///
    /// Not validated here; malformed content inside it is the consumer's
    /// concern.
    pub apps: Value,
}

impl AppConfig {
    /// Assemble a relay configuration with the stock defaults, merging the
    /// `apps` sub-tree from the descriptor at [`APPS_CONFIG_PATH`].
    #[must_use]
    pub fn for_relay(port: u16, prefer_secure: bool, capability: bool) -> Self {
        Self::load(APPS_CONFIG_PATH, port, prefer_secure, capability)
    }

    /// Same as [`AppConfig::for_relay`] but reading the descriptor from an
    /// explicit path.
    #[must_use]
    pub fn load(path: impl AsRef<Path>, port: u16, prefer_secure: bool, capability: bool) -> Self {
        Self {
            port,
            hostname: "127.0.0.1".to_string(),
            verbose: true,
            pubsub_hosts: vec!["localhost".to_string()],
            pubsub_port: pick_free_port(),
            pubsub_password: String::new(),
            tls: TlsOptions::server(prefer_secure, capability),
            apps: load_apps(path),
        }
    }

    /// Address string the relay listener binds.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Read the `apps` sub-tree from the descriptor at `path`.
///
/// An absent, unreadable, or empty file falls back to `Value::Null`
/// silently. Note the fallback cannot distinguish "file absent" from "file
/// present but unreadable", so both are logged at debug with the underlying
/// reason.
#[must_use]
pub fn load_apps(path: impl AsRef<Path>) -> Value {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) if !contents.is_empty() => contents,
        Ok(_) => {
            debug!(path = %path.display(), "apps descriptor is empty, using defaults");
            return Value::Null;
        }
        Err(error) => {
            debug!(path = %path.display(), %error, "cannot read apps descriptor, using defaults");
            return Value::Null;
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(mut doc) => match doc.get_mut("apps") {
            Some(apps) => apps.take(),
            None => Value::Null,
        },
        Err(error) => {
            debug!(path = %path.display(), %error, "apps descriptor is not valid JSON, using defaults");
            Value::Null
        }
    }
}

/// Allocate an ephemeral loopback port.
///
/// The listener is dropped immediately, so the port is only *probably* free
/// by the time a caller binds it. Good enough for test fixtures.
#[must_use]
pub fn pick_free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map_or(FALLBACK_PUBSUB_PORT, |addr| addr.port())
}
