use chrono::{DateTime, Duration, Utc};
use monitor_core::{Block, ModelClass, Period, Stats, UsageRecord};

use crate::error::Result;
use crate::services::cache::StatsCache;

/// Seam over the store so aggregation can be exercised and instrumented
/// without a real database.
pub trait RecordSource {
    fn records_in(&self, period: &Period) -> Result<Vec<UsageRecord>>;
}

impl RecordSource for monitor_db::Db {
    fn records_in(&self, period: &Period) -> Result<Vec<UsageRecord>> {
        let records = match period.start {
            Some(start) => self.range_query(start, period.end)?,
            None => self.scan_all()?,
        };
        Ok(records)
    }
}

/// Reduce raw records into base/premium aggregates for a period,
/// optionally annotated with the rate-limit block they fall in.
pub fn aggregate(records: &[UsageRecord], period: Period, block: Option<Block>) -> Stats {
    let mut stats = Stats::empty(period);
    stats.block = block;
    for record in records {
        match record.model_class() {
            ModelClass::Base => {
                stats.base_requests += 1;
                stats.base_tokens = stats.base_tokens.add(&record.tokens);
                stats.base_cost_usd += record.cost_usd;
            }
            ModelClass::Premium => {
                stats.premium_requests += 1;
                stats.premium_tokens = stats.premium_tokens.add(&record.tokens);
                stats.premium_cost_usd += record.cost_usd;
            }
        }
    }
    stats
}

/// Memoized aggregation: a cache hit never touches the source; a miss
/// reads it exactly once and stores the result.
pub fn stats_for(
    source: &dyn RecordSource,
    cache: &StatsCache,
    period: Period,
    block: Option<Block>,
) -> Result<Stats> {
    if let Some(stats) = cache.get(&period) {
        return Ok(stats);
    }
    let records = source.records_in(&period)?;
    let stats = aggregate(&records, period, block);
    cache.set(period, stats.clone());
    Ok(stats)
}

/// Premium limited-token consumption per minute over the stats period.
/// All-time and degenerate periods have no meaningful divisor.
pub fn burn_rate_per_minute(stats: &Stats) -> f64 {
    if stats.period.is_all_time() {
        return 0.0;
    }
    let minutes = stats.period.duration().num_seconds() as f64 / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    stats.premium_tokens.limited() as f64 / minutes
}

/// Display view of rate-limit consumption, capped at 100%.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockProgressView {
    pub percentage: f64,
    pub used_tokens: u64,
    pub token_limit: u64,
}

pub fn block_progress(stats: &Stats) -> BlockProgressView {
    let Some(block) = stats.block else {
        return BlockProgressView::default();
    };
    if block.is_unlimited() || block.start.timestamp() == 0 {
        return BlockProgressView::default();
    }
    let usage = super::blocks::progress(&block, &stats.premium_tokens);
    BlockProgressView {
        percentage: usage.percentage.min(100.0),
        used_tokens: usage.used_tokens,
        token_limit: block.token_limit,
    }
}

/// Time until the attached block elapses, clamped at zero.
pub fn block_time_remaining(stats: &Stats, now: DateTime<Utc>) -> Duration {
    match stats.block {
        Some(block) if block.end() > now => block.end() - now,
        _ => Duration::zero(),
    }
}
