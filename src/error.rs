//! Error types for relay startup and connection handling.
//!
//! Only failures that must be surfaced to a caller live here. Per-peer
//! delivery failures and unreadable config files degrade to log lines
//! instead of propagating (see [`crate::relay`] and [`crate::config`]).

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the relay.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The listener could not acquire its address. Fatal to startup: the
    /// server never begins accepting when this is returned.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the listener attempted to bind.
        addr: String,
        /// Underlying reason from the OS.
        source: std::io::Error,
    },

    /// WebSocket upgrade failed on an accepted socket. Fatal to that
    /// connection only; the accept loop keeps running.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = Error::Bind {
            addr: "127.0.0.1:9001".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind 127.0.0.1:9001: address in use"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
