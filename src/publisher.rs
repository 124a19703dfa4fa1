//! Scripted, time-paced publishing against a pub/sub channel.
//!
//! A script is an ordered list of [`PublishRecord`]s replayed with
//! real-time pacing to generate a reproducible load pattern; the records'
//! offsets are absolute from script start, so pacing never drifts with how
//! long individual publish calls take. The pub/sub client transport itself
//! is a collaborator behind the [`Publisher`] trait.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// One scheduled publish operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Channel the payload is published to.
    pub channel: String,
    /// Payload handed to the publish call as-is.
    pub payload: Value,
    /// Offset from script start at which this record fires.
    pub offset: Duration,
}

impl PublishRecord {
    /// Create a record firing `offset_ms` after script start.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: Value, offset_ms: u64) -> Self {
        Self {
            channel: channel.into(),
            payload,
            offset: Duration::from_millis(offset_ms),
        }
    }
}

/// Fire-and-forget publishing client.
///
/// The script does not wait for acknowledgment beyond what the publish call
/// itself guarantees.
pub trait Publisher {
    /// Publish one payload to a channel.
    fn publish(&self, channel: &str, payload: &Value);
}

/// An ordered publish sequence replayed with real-time pacing.
///
/// The session identifier is generated fresh per script instance so
/// repeated runs are distinguishable downstream.
#[derive(Debug, Clone)]
pub struct PublisherScript {
    records: Vec<PublishRecord>,
    session: String,
}

impl PublisherScript {
    /// Create a script over `records`, generating a fresh session id.
    #[must_use]
    pub fn new(records: Vec<PublishRecord>) -> Self {
        Self {
            records,
            session: generate_session_id(),
        }
    }

    /// Session identifier for this run.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// The records this script replays, in order.
    #[must_use]
    pub fn records(&self) -> &[PublishRecord] {
        &self.records
    }

    /// Replay the script against `publisher`.
    ///
    /// Each record fires no earlier than its offset from script start, in
    /// input order. Runs to completion; no cancellation beyond the pacing
    /// itself.
    pub async fn run<P: Publisher>(&self, publisher: &P) {
        let start = Instant::now();
        for record in &self.records {
            sleep_until(start + record.offset).await;
            debug!(
                session = %self.session,
                channel = %record.channel,
                offset_ms = record.offset.as_millis() as u64,
                "publishing"
            );
            publisher.publish(&record.channel, &record.payload);
        }
    }
}

/// Generate a session identifier: whole seconds since the epoch, as a
/// decimal string.
///
/// Coarse-grained on purpose; collisions across rapid successive runs are
/// the consumer's responsibility.
#[must_use]
pub fn generate_session_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
        .to_string()
}

/// The stock metrics load: an fps reading pushed to staggered channels in
/// half-second waves.
#[must_use]
pub fn metrics_script() -> Vec<PublishRecord> {
    let msg = json!({ "fps": 60 });
    vec![
        PublishRecord::new("sms_metric_A_id", msg.clone(), 500),
        PublishRecord::new("sms_metric_B_id", msg.clone(), 500),
        PublishRecord::new("sms_metric_A_id", msg.clone(), 1000),
        PublishRecord::new("sms_metric_D_id", msg.clone(), 1000),
        PublishRecord::new("sms_metric_A_id", msg.clone(), 1500),
        PublishRecord::new("sms_metric_F_id", msg, 1500),
    ]
}
