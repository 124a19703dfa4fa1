//! Pacing tests for scripted publishing.
//!
//! Runs under tokio's paused clock, so sleeps auto-advance and offsets are
//! asserted exactly.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;

use wsrelay::{PublishRecord, Publisher, PublisherScript};

struct RecordingPublisher {
    start: Instant,
    events: Mutex<Vec<(String, Duration)>>,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<(String, Duration)> {
        self.events.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, channel: &str, _payload: &Value) {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), self.start.elapsed()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_records_fire_at_their_offsets_in_order() {
    let offsets = [0u64, 500, 1000, 1500];
    let records: Vec<PublishRecord> = offsets
        .iter()
        .map(|&ms| PublishRecord::new(format!("chan_{}", ms), json!({ "n": ms }), ms))
        .collect();

    let publisher = RecordingPublisher::new();
    PublisherScript::new(records).run(&publisher).await;

    let events = publisher.events();
    assert_eq!(events.len(), offsets.len());
    for (event, &ms) in events.iter().zip(offsets.iter()) {
        assert_eq!(event.0, format!("chan_{}", ms));
        // No record fires early; under the paused clock the elapsed time is
        // exactly the scheduled offset.
        assert_eq!(event.1, Duration::from_millis(ms));
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_record_waits_its_own_offset() {
    let records = vec![PublishRecord::new("late", json!(null), 700)];
    let publisher = RecordingPublisher::new();
    PublisherScript::new(records).run(&publisher).await;

    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_same_offset_records_keep_input_order() {
    let records = vec![
        PublishRecord::new("first", json!(1), 250),
        PublishRecord::new("second", json!(2), 250),
        PublishRecord::new("third", json!(3), 250),
    ];
    let publisher = RecordingPublisher::new();
    PublisherScript::new(records).run(&publisher).await;

    let channels: Vec<String> = publisher.events().into_iter().map(|e| e.0).collect();
    assert_eq!(channels, vec!["first", "second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn test_stock_metrics_script_pacing() {
    let publisher = RecordingPublisher::new();
    PublisherScript::new(wsrelay::metrics_script())
        .run(&publisher)
        .await;

    let events = publisher.events();
    assert_eq!(events.len(), 6);
    // Pairs land in half-second waves.
    assert_eq!(events[0].1, Duration::from_millis(500));
    assert_eq!(events[1].1, Duration::from_millis(500));
    assert_eq!(events[2].1, Duration::from_millis(1000));
    assert_eq!(events[4].1, Duration::from_millis(1500));
    assert!(events.iter().all(|e| e.0.starts_with("sms_metric_")));
}
