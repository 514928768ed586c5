use chrono::{DateTime, Utc};
use monitor_core::{TokenCounts, UsageRecord, normalize_model};
use serde_json::Value;

/// Log body sentinel marking an API request record. Every other log entry
/// is acknowledged and dropped.
pub const API_REQUEST_BODY: &str = "claude_code.api_request";

/// Decode an OTLP/HTTP JSON log export into usage records. Entries that do
/// not carry the sentinel body are protocol-conformant noise, not errors.
/// Missing or unparseable attributes degrade to defaults; a bad timestamp
/// falls back to the ingestion instant `now`.
pub fn decode_log_batch(payload: &Value, now: DateTime<Utc>) -> Vec<UsageRecord> {
    let mut records = Vec::new();
    for resource in list(payload, &["resourceLogs", "resource_logs"]) {
        for scope in list(resource, &["scopeLogs", "scope_logs"]) {
            for log in list(scope, &["logRecords", "log_records"]) {
                if let Some(record) = decode_log_record(log, now) {
                    records.push(record);
                }
            }
        }
    }
    records
}

fn decode_log_record(log: &Value, now: DateTime<Utc>) -> Option<UsageRecord> {
    let body = log
        .get("body")
        .and_then(|body| body.get("stringValue").or_else(|| body.get("string_value")))
        .and_then(Value::as_str)?;
    if body != API_REQUEST_BODY {
        return None;
    }
    let attrs = log.get("attributes");
    let timestamp = attr(attrs, "event.timestamp")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(now);
    Some(UsageRecord {
        session_id: attr(attrs, "session.id").unwrap_or_default().to_string(),
        timestamp,
        model: normalize_model(attr(attrs, "model").unwrap_or_default()),
        tokens: TokenCounts::new(
            parse_count(attr(attrs, "input_tokens")),
            parse_count(attr(attrs, "output_tokens")),
            parse_count(attr(attrs, "cache_read_tokens")),
            parse_count(attr(attrs, "cache_creation_tokens")),
        ),
        cost_usd: parse_amount(attr(attrs, "cost_usd")),
        duration_ms: parse_count(attr(attrs, "duration_ms")),
    })
}

fn list<'a>(value: &'a Value, keys: &[&str]) -> impl Iterator<Item = &'a Value> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

/// Attribute values arrive string-typed and are parsed locally.
fn attr<'a>(attrs: Option<&'a Value>, key: &str) -> Option<&'a str> {
    let items = attrs?.as_array()?;
    items
        .iter()
        .find(|item| item.get("key").and_then(Value::as_str) == Some(key))
        .and_then(|item| item.get("value"))
        .and_then(|value| {
            value
                .get("stringValue")
                .or_else(|| value.get("string_value"))
        })
        .and_then(Value::as_str)
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

fn parse_amount(raw: Option<&str>) -> f64 {
    let amount = raw
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    if amount.is_finite() && amount >= 0.0 {
        amount
    } else {
        0.0
    }
}
