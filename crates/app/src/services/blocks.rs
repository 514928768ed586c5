use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use monitor_core::{BLOCK_DURATION, Block, TokenCounts};

use crate::error::{AppError, Result};

/// Raw rate-limit consumption against a block. The percentage is uncapped;
/// display capping is the aggregator's concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockUsage {
    pub used_tokens: u64,
    pub percentage: f64,
    pub exceeded: bool,
}

impl BlockUsage {
    fn zero() -> Self {
        Self {
            used_tokens: 0,
            percentage: 0.0,
            exceeded: false,
        }
    }
}

/// Resolve the rate-limit window covering `now`.
///
/// The reference is today at `start_hour:00` in `tz`. A `now` more than 12
/// hours before the reference means the configured hour belongs to
/// yesterday's day (a 23:00 start hour observed just after midnight), so
/// the reference shifts back one calendar day. A `now` still before the
/// reference yields the upcoming, not-yet-begun block.
pub fn resolve(start_hour: u32, tz: Tz, token_limit: u64, now: DateTime<Utc>) -> Block {
    let start_hour = start_hour.min(23);
    let mut date = now.with_timezone(&tz).date_naive();
    let mut reference = reference_at(tz, date, start_hour);
    if now < reference - Duration::hours(12) {
        date = date.pred_opt().unwrap_or(date);
        reference = reference_at(tz, date, start_hour);
    }
    if now < reference {
        return Block::new(reference.with_timezone(&Utc), token_limit);
    }
    let index = (now - reference.with_timezone(&Utc)).num_seconds() / BLOCK_DURATION.num_seconds();
    let start = reference.with_timezone(&Utc) + BLOCK_DURATION * index as i32;
    Block::new(start, token_limit)
}

fn reference_at(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Tz> {
    let naive = date
        .and_hms_opt(hour, 0, 0)
        .expect("hour is clamped to 0-23");
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Start hour falls inside a DST gap; take the next valid hour.
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => tz.from_utc_datetime(&naive),
        },
    }
}

/// Roll a block forward to cover `now`, preserving its token limit. A
/// still-active block is returned unchanged.
pub fn advance(block: Block, now: DateTime<Utc>) -> Block {
    if now < block.end() {
        return block;
    }
    let index = (now - block.start).num_seconds() / BLOCK_DURATION.num_seconds();
    Block::new(
        block.start + BLOCK_DURATION * index as i32,
        block.token_limit,
    )
}

/// Consumption of `premium_tokens` against the block limit. Cache tokens
/// never count; an unlimited block is never exceeded.
pub fn progress(block: &Block, premium_tokens: &TokenCounts) -> BlockUsage {
    if block.is_unlimited() {
        return BlockUsage::zero();
    }
    let used = premium_tokens.limited();
    BlockUsage {
        used_tokens: used,
        percentage: (used as f64 / block.token_limit as f64) * 100.0,
        exceeded: used > block.token_limit,
    }
}

/// Render a block as `"10am - 3pm"` in the given timezone.
pub fn format_block(block: &Block, tz: Tz) -> String {
    let start = block.start.with_timezone(&tz);
    let end = block.end().with_timezone(&tz);
    format!("{} - {}", hour_label(start.hour()), hour_label(end.hour()))
}

fn hour_label(hour: u32) -> String {
    let (display, suffix) = match hour {
        0 => (12, "am"),
        12 => (12, "pm"),
        h if h < 12 => (h, "am"),
        h => (h - 12, "pm"),
    };
    format!("{display}{suffix}")
}

/// Parse a human start-hour string like `"5am"` or `"11pm"` into 0-23.
pub fn parse_clock_hour(raw: &str) -> Result<u32> {
    let value = raw.trim().to_ascii_lowercase();
    let (digits, is_pm) = if let Some(rest) = value.strip_suffix("am") {
        (rest, false)
    } else if let Some(rest) = value.strip_suffix("pm") {
        (rest, true)
    } else {
        return Err(AppError::InvalidInput(format!(
            "clock hour needs an am/pm suffix: {raw}"
        )));
    };
    let hour = digits
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::InvalidInput(format!("invalid clock hour: {raw}")))?;
    if !(1..=12).contains(&hour) {
        return Err(AppError::InvalidInput(format!(
            "clock hour must be 1-12: {raw}"
        )));
    }
    Ok(match (hour, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}
