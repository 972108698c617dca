//! Tests for session metrics and table export

use crate::metrics::{ExecutionRecord, MetricsTable, SessionMetrics, TABLE_COLUMNS};
use chrono::{TimeZone, Utc};

fn at(ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
}

fn sample_session() -> SessionMetrics {
    let mut metrics = SessionMetrics::new();
    metrics.record(ExecutionRecord::success("getItem", at(0), at(120), 200, 0));
    metrics.record(ExecutionRecord::success("listItems", at(200), at(900), 200, 2));
    metrics.record(ExecutionRecord::failure(
        "createItem",
        at(1000),
        at(1050),
        Some(422),
        0,
        "HTTP_422",
        "name, qty: \"required\"",
    ));
    metrics
}

#[test]
fn test_totals_balance() {
    let metrics = sample_session();
    assert_eq!(metrics.total_operations(), 3);
    assert_eq!(metrics.successful_operations(), 2);
    assert_eq!(metrics.failed_operations(), 1);
    assert_eq!(
        metrics.total_operations(),
        metrics.successful_operations() + metrics.failed_operations()
    );
    assert_eq!(metrics.retried_operations(), 1);
    assert_eq!(metrics.total_retries(), 2);
}

#[test]
fn test_record_duration() {
    let metrics = sample_session();
    assert_eq!(metrics.records()[1].duration_ms, 700);
    assert_eq!(metrics.last().unwrap().operation_id, "createItem");
}

#[test]
fn test_summary() {
    let summary = sample_session().summary();
    assert_eq!(summary.total_operations, 3);
    assert!((summary.success_rate - 2.0 / 3.0).abs() < 1e-9);

    let empty = SessionMetrics::new().summary();
    assert_eq!(empty.success_rate, 0.0);
}

#[test]
fn test_table_layout_and_escaping() {
    let table = sample_session().to_table();
    let lines: Vec<&str> = table.lines().collect();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], TABLE_COLUMNS.join(","));
    assert_eq!(
        lines[1],
        "getItem,2023-11-14T22:13:20.000Z,2023-11-14T22:13:20.120Z,120,200,0,true,,"
    );
    assert!(lines[3].ends_with(r#",HTTP_422,"name, qty: ""required""""#));
}

#[test]
fn test_table_export_is_idempotent() {
    let metrics = sample_session();
    assert_eq!(metrics.to_table(), metrics.to_table());
}

#[test]
fn test_custom_delimiter_quotes_only_when_needed() {
    let metrics = sample_session();
    let table = MetricsTable::new()
        .with_delimiter('\t')
        .render(metrics.records());
    let failure = table.lines().nth(3).unwrap();
    assert!(failure.ends_with("\"name, qty: \"\"required\"\"\""));
}

#[test]
fn test_reset_clears_records() {
    let mut metrics = sample_session();
    let old_id = metrics.session_id();
    metrics.reset();
    assert_eq!(metrics.total_operations(), 0);
    assert_ne!(metrics.session_id(), old_id);
    assert_eq!(metrics.to_table().lines().count(), 1);
}
