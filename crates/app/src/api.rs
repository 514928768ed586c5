use chrono::{DateTime, Utc};
use monitor_core::Stats;
use serde::{Deserialize, Serialize};

/// Stats request: an absent start means all-time, an absent end means now.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Record listing request. `limit`/`offset` of 0 mean unlimited / no
/// offset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecordsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurgeQuery {
    pub before: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

/// Stats scoped to the current rate-limit block, annotated for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockStatsResponse {
    pub stats: Stats,
    pub window: String,
    pub burn_rate_per_minute: f64,
    pub progress_percent: f64,
    pub exceeded: bool,
    pub remaining_seconds: i64,
    pub plan_usage_percent: f64,
}
