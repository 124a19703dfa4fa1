//! Process-wide traffic accounting shared by all connections.
//!
//! The relay invokes a registered [`TransferObserver`] synchronously on every
//! message payload it moves. [`TrafficMeter`] is the stock observer: two
//! lock-free byte counters that only ever grow. The meter is an injectable
//! component rather than a hidden global so tests can run independent meters
//! side by side.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Direction of a transfer relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes received from a peer.
    Incoming,
    /// Bytes delivered to a peer.
    Outgoing,
}

/// Observer invoked synchronously for every unit of data moved.
///
/// Implementations must stay side-effect-free beyond their own bookkeeping:
/// the hook runs inline in connection tasks, so anything slow or reentrant
/// here stalls delivery.
pub trait TransferObserver: Send + Sync {
    /// Record that `bytes` moved in `direction`.
    fn on_transfer(&self, bytes: usize, direction: Direction);
}

/// Cumulative byte counters for both transfer directions.
///
/// Counters are monotonically non-decreasing and never reset for the
/// lifetime of the meter. Reads during concurrent updates see an
/// eventually-consistent view; only the totals after all transfers quiesce
/// are exact.
#[derive(Debug, Default)]
pub struct TrafficMeter {
    incoming: AtomicU64,
    outgoing: AtomicU64,
}

/// Point-in-time view of a [`TrafficMeter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSnapshot {
    /// Total bytes received across all connections.
    pub incoming: u64,
    /// Total bytes sent across all connections.
    pub outgoing: u64,
}

impl TrafficMeter {
    /// Create a meter with both counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically add `bytes` to the counter for `direction`.
    pub fn record(&self, bytes: usize, direction: Direction) {
        let counter = match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Current totals for both directions.
    #[must_use]
    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            incoming: self.incoming.load(Ordering::Relaxed),
            outgoing: self.outgoing.load(Ordering::Relaxed),
        }
    }

    /// Emit the traffic report to the log sink.
    ///
    /// On demand only; nothing in the crate calls this on a timer.
    pub fn report(&self) {
        let snapshot = self.snapshot();
        info!("{}", snapshot.incoming);
        info!("Incoming bytes: {}", snapshot.incoming);
        info!("Outgoing bytes: {}", snapshot.outgoing);
    }
}

impl TransferObserver for TrafficMeter {
    fn on_transfer(&self, bytes: usize, direction: Direction) {
        self.record(bytes, direction);
    }
}

/// Render a payload as `prefix: payload => hex` for wire-level debugging.
///
/// Non-UTF-8 payload bytes are replaced in the readable half; the hex half
/// is always exact.
#[must_use]
pub fn hex_dump(prefix: &str, payload: &[u8]) -> String {
    let mut hex = String::with_capacity(payload.len() * 2);
    for byte in payload {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("{}: {} => {}", prefix, String::from_utf8_lossy(payload), hex)
}
