use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of a provider rate-limit window.
pub const BLOCK_DURATION: Duration = Duration::hours(5);

/// Model name used when a record arrives without one.
pub const UNKNOWN_MODEL: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

impl TokenCounts {
    pub fn new(input: u64, output: u64, cache_read: u64, cache_creation: u64) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_creation,
        }
    }

    /// All four counts combined.
    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_creation)
    }

    /// Tokens that count against provider rate limits (cache excluded).
    pub fn limited(&self) -> u64 {
        self.input.saturating_add(self.output)
    }

    pub fn cache(&self) -> u64 {
        self.cache_read.saturating_add(self.cache_creation)
    }

    pub fn add(&self, other: &TokenCounts) -> TokenCounts {
        TokenCounts {
            input: self.input.saturating_add(other.input),
            output: self.output.saturating_add(other.output),
            cache_read: self.cache_read.saturating_add(other.cache_read),
            cache_creation: self.cache_creation.saturating_add(other.cache_creation),
        }
    }
}

/// A time range over which records are aggregated. `start == None` is the
/// all-time sentinel, which is not a calendar range and has zero duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end,
        }
    }

    pub fn all_time(end: DateTime<Utc>) -> Self {
        Self { start: None, end }
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none()
    }

    pub fn duration(&self) -> Duration {
        match self.start {
            Some(start) => self.end - start,
            None => Duration::zero(),
        }
    }
}

/// One API request as recorded at ingestion time. Append-only; corrections
/// require a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tokens: TokenCounts,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl UsageRecord {
    pub fn model_class(&self) -> ModelClass {
        classify_model(&self.model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClass {
    Base,
    Premium,
}

/// Base models are excluded from rate-limit-relevant token counting but
/// still count toward spend. Unrecognized and empty names are premium.
pub fn classify_model(model: &str) -> ModelClass {
    if model.to_ascii_lowercase().contains("haiku") {
        ModelClass::Base
    } else {
        ModelClass::Premium
    }
}

pub fn normalize_model(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        UNKNOWN_MODEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A rolling 5-hour rate-limit window. Advancing a block produces a new
/// value; only the token limit is operator-configured, the start instant is
/// always recomputed from the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: DateTime<Utc>,
    pub token_limit: u64,
}

impl Block {
    pub fn new(start: DateTime<Utc>, token_limit: u64) -> Self {
        Self { start, token_limit }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + BLOCK_DURATION
    }

    pub fn is_unlimited(&self) -> bool {
        self.token_limit == 0
    }
}

/// Aggregated usage over a period, split base vs premium. Totals are
/// derived sums; there is no independently settable total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub period: Period,
    pub base_requests: u64,
    pub premium_requests: u64,
    pub base_tokens: TokenCounts,
    pub premium_tokens: TokenCounts,
    pub base_cost_usd: f64,
    pub premium_cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

impl Stats {
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            base_requests: 0,
            premium_requests: 0,
            base_tokens: TokenCounts::default(),
            premium_tokens: TokenCounts::default(),
            base_cost_usd: 0.0,
            premium_cost_usd: 0.0,
            block: None,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.base_requests.saturating_add(self.premium_requests)
    }

    pub fn total_tokens(&self) -> TokenCounts {
        self.base_tokens.add(&self.premium_tokens)
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.base_cost_usd + self.premium_cost_usd
    }
}

/// Subscription plan used for spend-percentage reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Unset,
    Pro,
    Max,
    Max20,
}

impl Plan {
    pub fn from_name(name: &str) -> Option<Plan> {
        match name.to_ascii_lowercase().as_str() {
            "unset" => Some(Plan::Unset),
            "pro" => Some(Plan::Pro),
            "max" => Some(Plan::Max),
            "max20" => Some(Plan::Max20),
            _ => None,
        }
    }

    pub fn monthly_price_usd(&self) -> f64 {
        match self {
            Plan::Unset => 0.0,
            Plan::Pro => 20.0,
            Plan::Max => 100.0,
            Plan::Max20 => 200.0,
        }
    }

    pub fn usage_percent(&self, cost_usd: f64) -> f64 {
        let price = self.monthly_price_usd();
        if price <= 0.0 {
            return 0.0;
        }
        (cost_usd / price) * 100.0
    }
}

/// Percentage of the monthly plan price spent; an invalid plan name yields
/// zero rather than an error.
pub fn plan_usage_percent(plan_name: &str, cost_usd: f64) -> f64 {
    match Plan::from_name(plan_name) {
        Some(plan) => plan.usage_percent(cost_usd),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(value: &str) -> DateTime<Utc> {
        value.parse().expect("timestamp")
    }

    #[test]
    fn token_totals_derive_from_all_four_counts() {
        let tokens = TokenCounts::new(200, 100, 10, 5);
        assert_eq!(tokens.total(), 315);
        assert_eq!(tokens.limited(), 300);
        assert_eq!(tokens.cache(), 15);
    }

    #[test]
    fn token_add_is_commutative_with_zero_identity() {
        let a = TokenCounts::new(1, 2, 3, 4);
        let b = TokenCounts::new(10, 20, 30, 40);
        assert_eq!(a.add(&b), b.add(&a));
        assert_eq!(a.add(&TokenCounts::default()), a);
    }

    #[test]
    fn haiku_models_classify_as_base() {
        assert_eq!(classify_model("claude-haiku-4-5"), ModelClass::Base);
        assert_eq!(classify_model("Claude-HAIKU"), ModelClass::Base);
        assert_eq!(classify_model("claude-sonnet-4-5"), ModelClass::Premium);
        assert_eq!(classify_model(""), ModelClass::Premium);
        assert_eq!(classify_model("unknown"), ModelClass::Premium);
    }

    #[test]
    fn empty_model_names_normalize_to_unknown() {
        assert_eq!(normalize_model("  "), "unknown");
        assert_eq!(normalize_model("claude-opus-4"), "claude-opus-4");
    }

    #[test]
    fn block_end_is_five_hours_after_start() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let block = Block::new(start, 0);
        assert_eq!(block.end(), start + Duration::hours(5));
        assert!(block.is_unlimited());
    }

    #[test]
    fn all_time_period_has_zero_duration() {
        let period = Period::all_time(ts("2025-06-01T00:00:00Z"));
        assert!(period.is_all_time());
        assert_eq!(period.duration(), Duration::zero());

        let ranged = Period::new(ts("2025-06-01T00:00:00Z"), ts("2025-06-01T00:10:00Z"));
        assert_eq!(ranged.duration(), Duration::minutes(10));
    }

    #[test]
    fn stats_totals_are_derived_sums() {
        let period = Period::all_time(ts("2025-06-01T00:00:00Z"));
        let mut stats = Stats::empty(period);
        stats.base_requests = 1;
        stats.premium_requests = 2;
        stats.base_tokens = TokenCounts::new(100, 50, 0, 0);
        stats.premium_tokens = TokenCounts::new(200, 100, 10, 5);
        stats.base_cost_usd = 0.001;
        stats.premium_cost_usd = 0.002;

        assert_eq!(stats.total_requests(), 3);
        assert_eq!(stats.total_tokens().total(), 465);
        assert!((stats.total_cost_usd() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn plan_names_parse_case_insensitively() {
        assert_eq!(Plan::from_name("Pro"), Some(Plan::Pro));
        assert_eq!(Plan::from_name("MAX20"), Some(Plan::Max20));
        assert_eq!(Plan::from_name("enterprise"), None);
    }

    #[test]
    fn invalid_plan_yields_zero_usage_percent() {
        assert_eq!(plan_usage_percent("enterprise", 50.0), 0.0);
        assert_eq!(plan_usage_percent("unset", 50.0), 0.0);
        assert!((plan_usage_percent("max", 50.0) - 50.0).abs() < 1e-9);
        assert!((plan_usage_percent("pro", 30.0) - 150.0).abs() < 1e-9);
    }
}
