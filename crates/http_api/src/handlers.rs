use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use monitor_app::{AppError, PurgeQuery, PurgeResponse, RecordsQuery, StatsQuery};
use monitor_core::{Period, UsageRecord};
use serde_json::{Value, json};

use crate::{errors::HttpError, state::HttpState};

fn period_from(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Period, HttpError> {
    let end = end.unwrap_or_else(Utc::now);
    match start {
        Some(start) if start > end => Err(HttpError::from(AppError::InvalidInput(format!(
            "start {start} is after end {end}"
        )))),
        Some(start) => Ok(Period::new(start, end)),
        None => Ok(Period::all_time(end)),
    }
}

/// OTLP/HTTP log export intake. Decoding is total: the exporter always
/// gets a success acknowledgement, whatever the payload held.
pub async fn otlp_logs(
    State(state): State<HttpState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let records = ingest::decode_log_batch(&payload, Utc::now());
    let decoded = records.len();
    let mut queued = 0usize;
    for record in records {
        if state.intake.push(record) {
            queued += 1;
        }
    }
    if decoded > 0 {
        tracing::debug!(decoded, queued, "otlp log export processed");
    }
    Json(json!({}))
}

/// Metric and trace exports are acknowledged and dropped.
pub async fn otlp_discard() -> impl IntoResponse {
    Json(json!({}))
}

pub async fn stats(
    State(state): State<HttpState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let period = period_from(query.start, query.end)?;
    let stats = state.repository.stats_for_period(period).await?;
    Ok(Json(stats))
}

pub async fn current_block(
    State(state): State<HttpState>,
) -> Result<impl IntoResponse, HttpError> {
    let response = state.repository.current_block_stats().await?;
    Ok(Json(response))
}

pub async fn list_records(
    State(state): State<HttpState>,
    Query(query): Query<RecordsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let period = period_from(query.start, query.end)?;
    let records = state
        .repository
        .list_records(period, query.limit.unwrap_or(0), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(records))
}

pub async fn append_record(
    State(state): State<HttpState>,
    Json(record): Json<UsageRecord>,
) -> Result<impl IntoResponse, HttpError> {
    state.repository.append(record).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn purge_records(
    State(state): State<HttpState>,
    Query(query): Query<PurgeQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let deleted = state.repository.delete_older_than(query.before).await?;
    Ok(Json(PurgeResponse { deleted }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
