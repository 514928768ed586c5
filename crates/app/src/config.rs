use chrono_tz::Tz;
use monitor_core::Plan;

use crate::error::{AppError, Result};

/// Operator configuration consulted by the block tracker and stats
/// reporting. The block start instant itself is never stored; it is
/// recomputed from this configuration and the clock.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub plan: Plan,
    pub block_start_hour: u32,
    pub timezone: Tz,
    pub token_limit: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            plan: Plan::Unset,
            block_start_hour: 0,
            timezone: chrono_tz::UTC,
            token_limit: 0,
        }
    }
}

impl TrackerConfig {
    pub fn new(plan: Plan, block_start_hour: u32, timezone: Tz, token_limit: u64) -> Result<Self> {
        if block_start_hour > 23 {
            return Err(AppError::InvalidInput(format!(
                "block start hour must be 0-23, got {block_start_hour}"
            )));
        }
        Ok(Self {
            plan,
            block_start_hour,
            timezone,
            token_limit,
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| AppError::InvalidInput(format!("unknown timezone: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_start_hour() {
        let err = TrackerConfig::new(Plan::Pro, 24, chrono_tz::UTC, 0).expect_err("invalid");
        assert!(err.to_string().contains("0-23"));
    }

    #[test]
    fn parses_iana_timezones() {
        assert_eq!(
            parse_timezone("Europe/Berlin").expect("tz"),
            chrono_tz::Europe::Berlin
        );
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
