//! Connection lifecycle events and peer state.

use bytes::Bytes;

/// Event classified from one inbound transport frame.
///
/// Constructed per event, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Peer completed its upgrade.
    Open {
        /// Request URI from the upgrade.
        uri: String,
        /// Request headers, in wire order.
        headers: Vec<(String, String)>,
    },
    /// Application message to fan out.
    Message {
        /// Exact payload bytes.
        payload: Bytes,
        /// Whether the payload was a binary frame.
        is_binary: bool,
    },
    /// Peer is gone.
    Close,
}

/// Lifecycle state of one accepted peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerState {
    /// Accepted and registered, open event not yet dispatched.
    #[default]
    Open,
    /// Participating in broadcasts.
    Active,
    /// Removed from the active set.
    Closed,
}

impl PeerState {
    /// Whether the peer still belongs in the active set.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, PeerState::Closed)
    }
}
