//! Transport-scheme and TLS-material resolution for dual plaintext/secure
//! deployments.
//!
//! Whether an endpoint speaks `wss://` or `ws://` depends on two inputs: the
//! caller's intent (`prefer_secure`) and whether secure transport is
//! available in this deployment (`capability`). Capability is a runtime flag
//! resolved once at configuration time, so the same binary exercises both
//! modes. Resolution is pure and total; there are no error paths here.
//!
//! A server and the clients connecting to it must resolve from the same two
//! inputs or the handshake fails before this crate ever sees it.

use std::path::PathBuf;

/// Directory holding the fixed test certificate material, relative to the
/// working directory.
const CERT_DIR: &str = ".certs";

/// Resolve the WebSocket URI scheme.
///
/// Returns `"wss://"` only when the caller prefers secure transport AND the
/// deployment can provide it; `"ws://"` otherwise.
#[must_use]
pub const fn ws_scheme(prefer_secure: bool, capability: bool) -> &'static str {
    if prefer_secure && capability {
        "wss://"
    } else {
        "ws://"
    }
}

/// Resolve the scheme for auxiliary HTTP endpoints.
#[must_use]
pub const fn http_scheme(capability: bool) -> &'static str {
    if capability { "https://" } else { "http://" }
}

/// Derive the pub/sub endpoint address for a locally hosted channel.
#[must_use]
pub fn pubsub_endpoint(port: u16, prefer_secure: bool, capability: bool) -> String {
    format!("{}localhost:{}", ws_scheme(prefer_secure, capability), port)
}

/// TLS material and intent for one role (server or client).
///
/// Immutable once constructed. The paths are always populated; when
/// `secure_enabled` is false they are inert and the transport must ignore
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Certificate presented to the peer.
    pub cert_file: PathBuf,
    /// Private key for `cert_file`.
    pub key_file: PathBuf,
    /// CA bundle used to validate the peer.
    pub ca_file: PathBuf,
    /// Whether the connection should actually negotiate TLS.
    pub secure_enabled: bool,
}

impl TlsOptions {
    /// Options for the server role.
    ///
    /// `secure_enabled` holds only when the caller prefers TLS and the
    /// deployment is capable of it.
    #[must_use]
    pub fn server(prefer_secure: bool, capability: bool) -> Self {
        Self {
            cert_file: cert_path("trusted-server-crt.pem"),
            key_file: cert_path("trusted-server-key.pem"),
            ca_file: cert_path("trusted-ca-crt.pem"),
            secure_enabled: prefer_secure && capability,
        }
    }

    /// Options for the client role.
    ///
    /// Trust material is always populated so the client can validate a
    /// secure peer regardless of which scheme the endpoint resolves to.
    /// The scheme decision itself is per endpoint, via [`ws_scheme`].
    #[must_use]
    pub fn client() -> Self {
        Self {
            cert_file: cert_path("trusted-client-crt.pem"),
            key_file: cert_path("trusted-client-key.pem"),
            ca_file: cert_path("trusted-ca-crt.pem"),
            secure_enabled: false,
        }
    }
}

fn cert_path(file: &str) -> PathBuf {
    PathBuf::from(CERT_DIR).join(file)
}
