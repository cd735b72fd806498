use kpi_telemetry::{
    TelemetryMetrics, metrics, new_message_id, record_chunk_committed, record_chunk_failed,
    record_message_received,
};

#[test]
fn message_ids_are_unique() {
    let first = new_message_id();
    let second = new_message_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let metrics = TelemetryMetrics::new();
    assert_eq!(metrics.snapshot(), Default::default());
}

#[test]
fn chunk_counters_accumulate_rows() {
    let before = metrics().snapshot();
    record_message_received();
    record_chunk_committed(100);
    record_chunk_failed(50);
    let after = metrics().snapshot();

    assert!(after.messages_received >= before.messages_received + 1);
    assert!(after.chunks_committed >= before.chunks_committed + 1);
    assert!(after.rows_written >= before.rows_written + 100);
    assert!(after.chunks_failed >= before.chunks_failed + 1);
    assert!(after.rows_failed >= before.rows_failed + 50);
}
