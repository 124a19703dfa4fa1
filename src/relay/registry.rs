//! Active-connection set and broadcast fan-out.
//!
//! Membership changes and broadcast iteration contend on one mutex, but the
//! lock is only held to snapshot the member list; deliveries happen outside
//! it so a slow peer never extends the critical section. Each peer owns a
//! bounded outbox drained by its own writer task, which keeps one
//! recipient's broadcast batches from interleaving and keeps backpressure
//! per peer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::event::PeerState;

/// Opaque handle identifying one accepted peer.
pub type PeerId = u64;

/// Frame queued for delivery to one peer.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Exact payload bytes as received from the sender.
    pub payload: Bytes,
    /// Binary/text flag carried through unchanged.
    pub is_binary: bool,
}

#[derive(Debug, Clone)]
struct PeerHandle {
    tx: mpsc::Sender<Outbound>,
    addr: SocketAddr,
    state: PeerState,
}

/// Outcome of one broadcast batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastOutcome {
    /// Peers whose outbox accepted the frame.
    pub delivered: usize,
    /// Peers skipped because their outbox was full or torn down.
    pub dropped: usize,
}

/// Concurrent registry of active peers.
#[derive(Debug)]
pub struct Registry {
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    outbox_capacity: usize,
}

impl Registry {
    /// Create an empty registry with the given per-peer outbox capacity.
    #[must_use]
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbox_capacity,
        }
    }

    /// Add a peer to the active set, returning its handle and the receiving
    /// end of its outbox.
    pub fn register(&self, addr: SocketAddr) -> (PeerId, mpsc::Receiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let handle = PeerHandle {
            tx,
            addr,
            state: PeerState::Open,
        };
        self.lock().insert(id, handle);
        (id, rx)
    }

    /// Mark a peer as actively participating in broadcasts.
    pub fn mark_active(&self, id: PeerId) {
        if let Some(handle) = self.lock().get_mut(&id) {
            handle.state = PeerState::Active;
        }
    }

    /// Mark a peer as closed without removing it yet.
    ///
    /// A closed peer is excluded from broadcasts while its connection task
    /// finishes tearing down. Idempotent; a no-op for unknown peers.
    pub fn mark_closed(&self, id: PeerId) {
        if let Some(handle) = self.lock().get_mut(&id) {
            handle.state = PeerState::Closed;
        }
    }

    /// Remove a peer from the active set.
    ///
    /// Idempotent: removing an already-removed peer is a no-op and returns
    /// `false`.
    pub fn remove(&self, id: PeerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Deliver `payload` to every active peer except `sender`.
    ///
    /// The member list is snapshotted under the lock, then each target's
    /// outbox is attempted independently outside it. A full or torn-down
    /// outbox is recorded and skipped; it never aborts delivery to the
    /// remaining peers.
    pub fn broadcast(&self, sender: PeerId, payload: Bytes, is_binary: bool) -> BroadcastOutcome {
        let targets: Vec<(PeerId, mpsc::Sender<Outbound>, SocketAddr)> = self
            .lock()
            .iter()
            .filter(|(id, handle)| **id != sender && handle.state.is_active())
            .map(|(id, handle)| (*id, handle.tx.clone(), handle.addr))
            .collect();

        let mut outcome = BroadcastOutcome::default();
        for (id, tx, addr) in targets {
            let frame = Outbound {
                payload: payload.clone(),
                is_binary,
            };
            match tx.try_send(frame) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    warn!(peer = id, %addr, "outbox full, dropping broadcast frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Peer is tearing down mid-broadcast; fail soft.
                    outcome.dropped += 1;
                    debug!(peer = id, %addr, "peer closed mid-broadcast");
                }
            }
        }
        outcome
    }

    /// Drop every peer's outbox sender, signalling their writer tasks to
    /// close. Returns how many peers were drained.
    pub fn drain(&self) -> usize {
        let mut peers = self.lock();
        let count = peers.len();
        peers.clear();
        count
    }

    /// Number of peers in the active set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no peers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, PeerHandle>> {
        // Peer handles are plain data; a poisoned lock only means another
        // thread panicked between map operations.
        match self.peers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = Registry::new(4);
        let (a, _rx_a) = registry.register(addr(1));
        let (b, _rx_b) = registry.register(addr(2));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new(4);
        let (id, _rx) = registry.register(addr(1));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let registry = Registry::new(4);
        let (a, mut rx_a) = registry.register(addr(1));
        let (_b, mut rx_b) = registry.register(addr(2));
        let (_c, mut rx_c) = registry.register(addr(3));
        registry.mark_active(a);

        let outcome = registry.broadcast(a, Bytes::from_static(b"hello"), false);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.dropped, 0);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(&rx_b.try_recv().unwrap().payload[..], b"hello");
        assert_eq!(&rx_c.try_recv().unwrap().payload[..], b"hello");
    }

    #[test]
    fn test_broadcast_preserves_binary_flag() {
        let registry = Registry::new(4);
        let (a, _rx_a) = registry.register(addr(1));
        let (_b, mut rx_b) = registry.register(addr(2));

        registry.broadcast(a, Bytes::from_static(&[0xde, 0xad]), true);
        let frame = rx_b.try_recv().unwrap();
        assert!(frame.is_binary);
        assert_eq!(&frame.payload[..], &[0xde, 0xad]);
    }

    #[test]
    fn test_closed_peer_excluded_until_removed() {
        let registry = Registry::new(4);
        let (a, _rx_a) = registry.register(addr(1));
        let (b, mut rx_b) = registry.register(addr(2));
        let (_c, mut rx_c) = registry.register(addr(3));

        registry.mark_closed(b);
        // Still registered, but no longer a broadcast target.
        assert_eq!(registry.len(), 3);
        let outcome = registry.broadcast(a, Bytes::from_static(b"bye"), false);
        assert_eq!(outcome.delivered, 1);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(&rx_c.try_recv().unwrap().payload[..], b"bye");

        assert!(registry.remove(b));
        assert!(!registry.remove(b));
    }

    #[test]
    fn test_mark_closed_is_idempotent_for_unknown_peer() {
        let registry = Registry::new(4);
        let (id, _rx) = registry.register(addr(1));
        registry.remove(id);
        // Closing an already-removed peer is a no-op, not an error.
        registry.mark_closed(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_skips_removed_peer() {
        let registry = Registry::new(4);
        let (a, _rx_a) = registry.register(addr(1));
        let (b, _rx_b) = registry.register(addr(2));
        let (_c, mut rx_c) = registry.register(addr(3));

        registry.remove(b);
        let outcome = registry.broadcast(a, Bytes::from_static(b"world"), false);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(&rx_c.try_recv().unwrap().payload[..], b"world");
    }

    #[test]
    fn test_full_outbox_drops_without_aborting() {
        let registry = Registry::new(1);
        let (a, _rx_a) = registry.register(addr(1));
        let (_slow, _rx_slow) = registry.register(addr(2));
        let (_ok, mut rx_ok) = registry.register(addr(3));

        // First frame fills the slow peer's single-slot outbox.
        let first = registry.broadcast(a, Bytes::from_static(b"1"), false);
        assert_eq!(first.delivered, 2);

        // Second frame drops for the slow peer but still reaches the other.
        let second = registry.broadcast(a, Bytes::from_static(b"2"), false);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);

        assert_eq!(&rx_ok.try_recv().unwrap().payload[..], b"1");
        assert_eq!(&rx_ok.try_recv().unwrap().payload[..], b"2");
    }

    #[test]
    fn test_closed_outbox_counts_as_dropped() {
        let registry = Registry::new(4);
        let (a, _rx_a) = registry.register(addr(1));
        let (_b, rx_b) = registry.register(addr(2));
        drop(rx_b);

        let outcome = registry.broadcast(a, Bytes::from_static(b"x"), false);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_drain_clears_everything() {
        let registry = Registry::new(4);
        let (_a, mut rx_a) = registry.register(addr(1));
        let (_b, _rx_b) = registry.register(addr(2));

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        // Senders dropped: receivers observe closure.
        assert!(matches!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
