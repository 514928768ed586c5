use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{Period, Stats, UsageRecord};
use monitor_db::Db;
use reqwest::{Client, Response};

use crate::api::{BlockStatsResponse, PurgeResponse};
use crate::config::TrackerConfig;
use crate::error::{ApiError, AppError, Result};
use crate::services::blocks;
use crate::services::cache::StatsCache;
use crate::services::stats;

pub const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REMOTE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between consumers and the usage store. Local and remote
/// implementations answer the same questions; callers never know which
/// side of the network they are on.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<()>;

    /// Persist a drained ingestion batch. Returns how many records were
    /// written.
    async fn append_batch(&self, records: Vec<UsageRecord>) -> Result<usize>;

    /// Records within `period`, chronological. `limit` of 0 means
    /// unlimited.
    async fn list_records(
        &self,
        period: Period,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>>;

    /// Drop records strictly older than `cutoff`. Returns the count
    /// removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn stats_for_period(&self, period: Period) -> Result<Stats>;

    /// Stats scoped to the rate-limit block covering now, annotated for
    /// display.
    async fn current_block_stats(&self) -> Result<BlockStatsResponse>;
}

/// Repository over a database file on this machine. Connections are opened
/// per call; SQLite's WAL mode keeps concurrent readers off the writer's
/// back.
pub struct LocalRepository {
    db_path: PathBuf,
    read_only: bool,
    config: TrackerConfig,
    cache: Arc<StatsCache>,
}

impl LocalRepository {
    pub fn new(db_path: impl AsRef<Path>, read_only: bool, config: TrackerConfig) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            read_only,
            config,
            cache: Arc::new(StatsCache::new()),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn open_db(&self) -> Result<Db> {
        if self.read_only {
            Ok(Db::open_read_only(&self.db_path)?)
        } else {
            let mut db = Db::open(&self.db_path)?;
            db.migrate()?;
            Ok(db)
        }
    }
}

#[async_trait]
impl UsageRepository for LocalRepository {
    async fn append(&self, record: UsageRecord) -> Result<()> {
        if self.read_only {
            return Err(AppError::ReadOnly);
        }
        let mut db = self.open_db()?;
        db.append(&record)?;
        Ok(())
    }

    async fn append_batch(&self, records: Vec<UsageRecord>) -> Result<usize> {
        if self.read_only {
            return Err(AppError::ReadOnly);
        }
        let mut db = self.open_db()?;
        db.append_batch(&records)?;
        Ok(records.len())
    }

    async fn list_records(
        &self,
        period: Period,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let db = self.open_db()?;
        let records = stats::RecordSource::records_in(&db, &period)?;
        let take = if limit == 0 { usize::MAX } else { limit };
        Ok(records.into_iter().skip(offset).take(take).collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        if self.read_only {
            return Err(AppError::ReadOnly);
        }
        let mut db = self.open_db()?;
        let deleted = db.delete_older_than(cutoff)?;
        Ok(deleted)
    }

    async fn stats_for_period(&self, period: Period) -> Result<Stats> {
        let db = self.open_db()?;
        stats::stats_for(&db, &self.cache, period, None)
    }

    async fn current_block_stats(&self) -> Result<BlockStatsResponse> {
        let now = Utc::now();
        let block = blocks::resolve(
            self.config.block_start_hour,
            self.config.timezone,
            self.config.token_limit,
            now,
        );
        let period = Period::new(block.start, block.end());

        let db = self.open_db()?;
        let mut block_stats = stats::stats_for(&db, &self.cache, period, Some(block))?;
        // The cache may have served this period without the block attached.
        block_stats.block = Some(block);

        let usage = blocks::progress(&block, &block_stats.premium_tokens);
        let view = stats::block_progress(&block_stats);
        let remaining = stats::block_time_remaining(&block_stats, now);
        let plan_usage = self
            .config
            .plan
            .usage_percent(block_stats.total_cost_usd());

        Ok(BlockStatsResponse {
            window: blocks::format_block(&block, self.config.timezone),
            burn_rate_per_minute: stats::burn_rate_per_minute(&block_stats),
            progress_percent: view.percentage,
            exceeded: usage.exceeded,
            remaining_seconds: remaining.num_seconds(),
            plan_usage_percent: plan_usage,
            stats: block_stats,
        })
    }
}

/// Repository backed by another instance's HTTP API. Short timeouts keep a
/// slow remote from hanging the caller.
pub struct RemoteRepository {
    base_url: String,
    client: Client,
}

impl RemoteRepository {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(REMOTE_CONNECT_TIMEOUT)
            .timeout(REMOTE_CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        tracing::debug!(%status, "remote call failed");
        match response.json::<ApiError>().await {
            Ok(api_err) => Err(api_err.into_app_error()),
            Err(_) => Err(AppError::Remote(format!("remote returned {status}"))),
        }
    }

    fn period_params(period: &Period) -> Vec<(&'static str, String)> {
        let mut params = vec![("end", period.end.to_rfc3339())];
        if let Some(start) = period.start {
            params.push(("start", start.to_rfc3339()));
        }
        params
    }
}

#[async_trait]
impl UsageRepository for RemoteRepository {
    async fn append(&self, record: UsageRecord) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/records"))
            .json(&record)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn append_batch(&self, records: Vec<UsageRecord>) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.append(record).await?;
        }
        Ok(count)
    }

    async fn list_records(
        &self,
        period: Period,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let mut params = Self::period_params(&period);
        params.push(("limit", limit.to_string()));
        params.push(("offset", offset.to_string()));
        let response = self
            .client
            .get(self.url("/api/records"))
            .query(&params)
            .send()
            .await?;
        let records = Self::check(response).await?.json().await?;
        Ok(records)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let response = self
            .client
            .delete(self.url("/api/records"))
            .query(&[("before", cutoff.to_rfc3339())])
            .send()
            .await?;
        let purge: PurgeResponse = Self::check(response).await?.json().await?;
        Ok(purge.deleted)
    }

    async fn stats_for_period(&self, period: Period) -> Result<Stats> {
        let response = self
            .client
            .get(self.url("/api/stats"))
            .query(&Self::period_params(&period))
            .send()
            .await?;
        let stats = Self::check(response).await?.json().await?;
        Ok(stats)
    }

    async fn current_block_stats(&self) -> Result<BlockStatsResponse> {
        let response = self
            .client
            .get(self.url("/api/blocks/current"))
            .send()
            .await?;
        let block_stats = Self::check(response).await?.json().await?;
        Ok(block_stats)
    }
}
