use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use monitor_core::{Period, Stats};

/// How long a memoized aggregate is served before the store is consulted
/// again. Source records are append-only, so a stale-but-complete answer
/// is an accepted trade-off.
pub const CACHE_TTL: Duration = Duration::from_secs(30);

struct Entry {
    stats: Stats,
    inserted_at: Instant,
}

/// Period-keyed memo of aggregated stats. Two periods with identical
/// start/end (the all-time sentinel included) share one entry. Safe for
/// concurrent readers and writers; lookups hand out complete clones only.
pub struct StatsCache {
    ttl: Duration,
    entries: RwLock<HashMap<Period, Entry>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, period: &Period) -> Option<Stats> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(period)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.stats.clone())
    }

    pub fn set(&self, period: Period, stats: Stats) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        entries.insert(
            period,
            Entry {
                stats,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn identical_periods_share_an_entry() {
        let cache = StatsCache::new();
        let end = Utc::now();
        let period = Period::all_time(end);
        cache.set(period, Stats::empty(period));

        let same = Period::all_time(end);
        assert!(cache.get(&same).is_some());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = StatsCache::with_ttl(Duration::from_millis(0));
        let period = Period::all_time(Utc::now());
        cache.set(period, Stats::empty(period));
        assert!(cache.get(&period).is_none());
    }

    #[test]
    fn distinct_periods_do_not_collide() {
        let cache = StatsCache::new();
        let end = Utc::now();
        let all_time = Period::all_time(end);
        let ranged = Period::new(end - chrono::Duration::hours(1), end);
        cache.set(all_time, Stats::empty(all_time));
        assert!(cache.get(&ranged).is_none());
    }
}
