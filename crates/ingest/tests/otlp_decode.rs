use chrono::{TimeZone, Utc};
use ingest::{API_REQUEST_BODY, decode_log_batch};
use serde_json::json;

fn api_request_entry(attributes: serde_json::Value) -> serde_json::Value {
    json!({
        "body": { "stringValue": API_REQUEST_BODY },
        "attributes": attributes,
    })
}

fn batch(log_records: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "resourceLogs": [
            { "scopeLogs": [ { "logRecords": log_records } ] }
        ]
    })
}

fn attr(key: &str, value: &str) -> serde_json::Value {
    json!({ "key": key, "value": { "stringValue": value } })
}

#[test]
fn decodes_a_full_api_request_entry() {
    let now = Utc::now();
    let payload = batch(vec![api_request_entry(json!([
        attr("session.id", "sess-1"),
        attr("event.timestamp", "2025-06-01T10:00:00Z"),
        attr("model", "claude-sonnet-4-5"),
        attr("input_tokens", "200"),
        attr("output_tokens", "100"),
        attr("cache_read_tokens", "10"),
        attr("cache_creation_tokens", "5"),
        attr("cost_usd", "0.002"),
        attr("duration_ms", "730"),
    ]))]);

    let records = decode_log_batch(&payload, now);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.session_id, "sess-1");
    assert_eq!(
        record.timestamp,
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    );
    assert_eq!(record.model, "claude-sonnet-4-5");
    assert_eq!(record.tokens.input, 200);
    assert_eq!(record.tokens.output, 100);
    assert_eq!(record.tokens.cache_read, 10);
    assert_eq!(record.tokens.cache_creation, 5);
    assert_eq!(record.tokens.total(), 315);
    assert!((record.cost_usd - 0.002).abs() < 1e-12);
    assert_eq!(record.duration_ms, 730);
}

#[test]
fn non_sentinel_entries_are_dropped_without_error() {
    let now = Utc::now();
    let payload = batch(vec![
        json!({ "body": { "stringValue": "claude_code.tool_result" }, "attributes": [] }),
        json!({ "body": { "intValue": 7 } }),
        api_request_entry(json!([attr("session.id", "sess-1")])),
    ]);

    let records = decode_log_batch(&payload, now);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, "sess-1");
}

#[test]
fn bad_numerics_default_to_zero_and_bad_timestamp_to_now() {
    let now = Utc::now();
    let payload = batch(vec![api_request_entry(json!([
        attr("session.id", "sess-1"),
        attr("event.timestamp", "yesterday-ish"),
        attr("input_tokens", "not-a-number"),
        attr("cost_usd", "-3"),
    ]))]);

    let records = decode_log_batch(&payload, now);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.timestamp, now);
    assert_eq!(record.tokens.input, 0);
    assert_eq!(record.tokens.output, 0);
    assert_eq!(record.cost_usd, 0.0);
    assert_eq!(record.model, "unknown");
}

#[test]
fn snake_case_payloads_decode_too() {
    let now = Utc::now();
    let payload = json!({
        "resource_logs": [{
            "scope_logs": [{
                "log_records": [{
                    "body": { "string_value": API_REQUEST_BODY },
                    "attributes": [
                        { "key": "session.id", "value": { "string_value": "sess-2" } },
                        { "key": "output_tokens", "value": { "string_value": "42" } }
                    ]
                }]
            }]
        }]
    });

    let records = decode_log_batch(&payload, now);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, "sess-2");
    assert_eq!(records[0].tokens.output, 42);
}

#[test]
fn empty_and_foreign_payloads_decode_to_nothing() {
    let now = Utc::now();
    assert!(decode_log_batch(&json!({}), now).is_empty());
    assert!(decode_log_batch(&json!({ "resourceSpans": [] }), now).is_empty());
}
