//! Integration tests for the tracker runtime
//!
//! These tests drive the consumer loop over a scripted broker and verify
//! the audit trail, the metrics, the retry/DLQ path and shutdown behavior.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orderflow::config::Config;
use orderflow::error::Error;
use orderflow::kafka::DeadLetterQueue;
use orderflow::test_utils::{
    inbound_message, CaptureTransport, FlakyHandler, ScriptStep, ScriptedConsumer,
};
use orderflow::tracker::{Tracker, TrackerState};

const ORDER_PAYLOAD: &[u8] = br#"{"order_id":"abc","sequence":1,"status":"pending","customer_info":{"customer_id":"c1","name":"A"},"items":[{"item_id":"i1","item_name":"x","quantity":2,"unit_price":1.50,"total_price":3.00}],"subtotal":3.00,"tax":0.60,"shipping_fee":2.50,"total":6.10,"currency":"EUR","metadata":{"timestamp":"2024-01-01T00:00:00Z","version":"1.1","event_type":"order.created","source":"test","correlation_id":"z"}}"#;

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.tracker.log_file = dir.join("tracker.log").display().to_string();
    config.tracker.events_file = dir.join("tracker.events").display().to_string();
    config.tracker.read_timeout_ms = 20;
    config.retry.initial_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config
}

fn read_json_lines(path: &str) -> Vec<serde_json::Value> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Spawn the tracker, wait for the condition, stop it and join the loop
async fn run_until(
    tracker: Arc<Tracker>,
    condition: impl Fn(&Tracker) -> bool,
) -> Result<(), &'static str> {
    let runner = Arc::clone(&tracker);
    let handle = tokio::spawn(async move { runner.run().await });

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut satisfied = false;
    while Instant::now() < deadline {
        if condition(&tracker) {
            satisfied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tracker.stop();
    let _ = handle.await;
    if satisfied {
        Ok(())
    } else {
        Err("condition not reached before timeout")
    }
}

#[tokio::test]
async fn test_happy_path_audits_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let events_file = config.tracker.events_file.clone();

    let consumer = ScriptedConsumer::with_steps(vec![ScriptStep::Deliver(inbound_message(
        0,
        ORDER_PAYLOAD,
    ))]);

    let mut tracker = Tracker::new(&config);
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_received >= 1
    })
    .await
    .unwrap();
    tracker.close();

    let snap = tracker.metrics_snapshot();
    assert_eq!(snap.messages_received, 1);
    assert_eq!(snap.messages_processed, 1);
    assert_eq!(snap.messages_failed, 0);

    let lines = read_json_lines(&events_file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["deserialized"], true);
    assert_eq!(lines[0]["kafka_offset"], 0);
    assert_eq!(lines[0]["event_type"], "message.received");
    assert_eq!(lines[0]["order_full"]["order_id"], "abc");
}

#[tokio::test]
async fn test_malformed_payload_is_audited_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let events_file = config.tracker.events_file.clone();
    let log_file = config.tracker.log_file.clone();

    let handler = Arc::new(FlakyHandler::always_failing());
    let transport = CaptureTransport::new();
    let dlq_records = transport.records();

    let consumer = ScriptedConsumer::with_steps(vec![ScriptStep::Deliver(inbound_message(
        0,
        br#"{"invalid-json"#,
    ))]);

    let mut tracker = Tracker::new(&config)
        .with_handler(Arc::clone(&handler) as _)
        .with_dlq(DeadLetterQueue::with_transport(
            Box::new(transport),
            "orders-dlq",
        ));
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_failed >= 1
    })
    .await
    .unwrap();
    tracker.close();

    let snap = tracker.metrics_snapshot();
    assert_eq!(snap.messages_received, 1);
    assert_eq!(snap.messages_processed, 0);
    assert_eq!(snap.messages_failed, 1);

    // audited with the parse error
    let lines = read_json_lines(&events_file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["deserialized"], false);
    assert_eq!(
        lines[0]["event_type"],
        "message.received.deserialization_error"
    );
    assert!(lines[0]["error"].as_str().unwrap().len() > 0);
    assert_eq!(lines[0]["raw_message"], "{\"invalid-json");

    // a poison payload is never retried and never reaches the DLQ
    assert_eq!(handler.calls(), 0);
    assert!(dlq_records.lock().unwrap().is_empty());

    // and the failure shows up in the health log
    let health = std::fs::read_to_string(&log_file).unwrap();
    assert!(health.contains("Message deserialization failed"));
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let handler = Arc::new(FlakyHandler::failing_times(2));
    let consumer = ScriptedConsumer::with_steps(vec![ScriptStep::Deliver(inbound_message(
        0,
        ORDER_PAYLOAD,
    ))]);

    let mut tracker = Tracker::new(&config).with_handler(Arc::clone(&handler) as _);
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_received >= 1
    })
    .await
    .unwrap();
    tracker.close();

    assert_eq!(handler.calls(), 3);
    let snap = tracker.metrics_snapshot();
    assert_eq!(snap.messages_processed, 1);
    assert_eq!(snap.messages_failed, 0);
}

#[tokio::test]
async fn test_exhausted_retries_reach_dlq() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let handler = Arc::new(FlakyHandler::always_failing());
    let transport = CaptureTransport::new();
    let dlq_records = transport.records();

    let consumer = ScriptedConsumer::with_steps(vec![ScriptStep::Deliver(inbound_message(
        42,
        ORDER_PAYLOAD,
    ))]);

    let mut tracker = Tracker::new(&config)
        .with_handler(Arc::clone(&handler) as _)
        .with_dlq(DeadLetterQueue::with_transport(
            Box::new(transport),
            "orders-dlq",
        ));
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_failed >= 1
    })
    .await
    .unwrap();

    // three attempts, then one DLQ envelope carrying the provenance
    assert_eq!(handler.calls(), 3);

    let records = dlq_records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].topic, "orders-dlq");

    let envelope: serde_json::Value = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(envelope["original_topic"], "orders");
    assert_eq!(envelope["original_offset"], 42);
    assert_eq!(envelope["attempts"], 3);
    assert!(envelope["last_error"].as_str().unwrap().contains("temporary failure"));
    assert_eq!(
        envelope["payload"],
        String::from_utf8_lossy(ORDER_PAYLOAD).as_ref()
    );

    let headers = &records[0].headers;
    assert!(headers.contains(&("original-topic".to_string(), "orders".to_string())));
    assert!(headers.contains(&("attempts".to_string(), "3".to_string())));
    drop(records);

    // the delivery drain confirms the send
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = tracker.dlq_stats().unwrap();
    assert_eq!(stats.messages_sent, 1);
    assert_eq!(stats.send_errors, 0);

    let snap = tracker.metrics_snapshot();
    assert_eq!(snap.messages_failed, 1);
    assert_eq!(snap.messages_processed, 0);
    tracker.close();
}

#[tokio::test]
async fn test_permanent_handler_error_single_attempt_to_dlq() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let handler = Arc::new(FlakyHandler::permanent_failure());
    let transport = CaptureTransport::new();
    let dlq_records = transport.records();

    let consumer = ScriptedConsumer::with_steps(vec![ScriptStep::Deliver(inbound_message(
        7,
        ORDER_PAYLOAD,
    ))]);

    let mut tracker = Tracker::new(&config)
        .with_handler(Arc::clone(&handler) as _)
        .with_dlq(DeadLetterQueue::with_transport(
            Box::new(transport),
            "orders-dlq",
        ));
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_failed >= 1
    })
    .await
    .unwrap();
    tracker.close();

    assert_eq!(handler.calls(), 1);

    let records = dlq_records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let envelope: serde_json::Value = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(envelope["attempts"], 1);
}

#[tokio::test]
async fn test_broker_outage_stops_loop_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let log_file = config.tracker.log_file.clone();

    let consumer = ScriptedConsumer::with_steps(vec![
        ScriptStep::Fail(Error::BrokerUnavailable("1/1 brokers are down".to_string())),
        ScriptStep::Fail(Error::BrokerUnavailable("1/1 brokers are down".to_string())),
        ScriptStep::Fail(Error::BrokerUnavailable("1/1 brokers are down".to_string())),
    ]);

    let mut tracker = Tracker::new(&config);
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    // the loop stops on its own after MaxErrors consecutive failures
    let runner = Arc::clone(&tracker);
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("read loop should stop by itself")
        .unwrap();

    assert_eq!(tracker.state(), TrackerState::Stopping);
    tracker.close();

    let health = std::fs::read_to_string(&log_file).unwrap();
    assert!(health.contains("brokers_unavailable"), "{}", health);
}

#[tokio::test]
async fn test_stop_returns_within_one_read_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.tracker.read_timeout_ms = 100;

    let mut tracker = Tracker::new(&config);
    tracker
        .initialize_with(Box::new(ScriptedConsumer::new()))
        .unwrap();
    let tracker = Arc::new(tracker);

    let runner = Arc::clone(&tracker);
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stop_at = Instant::now();
    tracker.stop();
    handle.await.unwrap();
    let waited = stop_at.elapsed();

    assert!(
        waited <= Duration::from_millis(250),
        "loop took {:?} to observe stop",
        waited
    );
    tracker.close();
    assert_eq!(tracker.state(), TrackerState::Closed);
}

#[tokio::test]
async fn test_one_audit_line_per_delivered_offset() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let events_file = config.tracker.events_file.clone();

    let consumer = ScriptedConsumer::with_steps(vec![
        ScriptStep::Deliver(inbound_message(0, ORDER_PAYLOAD)),
        ScriptStep::Timeout,
        ScriptStep::Deliver(inbound_message(1, br#"{"invalid-json"#)),
        ScriptStep::Deliver(inbound_message(2, ORDER_PAYLOAD)),
    ]);

    let mut tracker = Tracker::new(&config);
    tracker.initialize_with(Box::new(consumer)).unwrap();
    let tracker = Arc::new(tracker);

    run_until(Arc::clone(&tracker), |t| {
        t.metrics_snapshot().messages_received >= 3
    })
    .await
    .unwrap();
    tracker.close();

    let lines = read_json_lines(&events_file);
    let offsets: Vec<i64> = lines
        .iter()
        .map(|l| l["kafka_offset"].as_i64().unwrap())
        .collect();
    assert_eq!(offsets, vec![0, 1, 2]);

    // received = processed + failed
    let snap = tracker.metrics_snapshot();
    assert_eq!(
        snap.messages_received,
        snap.messages_processed + snap.messages_failed
    );
}

#[tokio::test]
async fn test_subscribes_to_configured_topic() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.kafka.topic = "orders-test".to_string();

    let consumer = ScriptedConsumer::new();
    let subscription = consumer.subscription();

    let mut tracker = Tracker::new(&config);
    tracker.initialize_with(Box::new(consumer)).unwrap();

    assert_eq!(
        subscription.lock().unwrap().as_deref(),
        Some("orders-test")
    );
}
