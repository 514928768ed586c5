use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use monitor_core::{TokenCounts, UsageRecord};
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};

pub const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_init", MIGRATION_0001)];

/// Read-time cap for full scans. Oldest excess records are skipped, not
/// deleted; retention is a separate concern.
pub const SCAN_CAP: usize = 10_000;

const KEY_SEPARATOR: char = '_';
/// Sorts after the separator and every timestamp character, so an
/// end-boundary built with it includes all records stamped exactly at the
/// range end.
const RANGE_END_SENTINEL: char = '\u{7f}';

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database not found at {0}")]
    MissingDatabase(String),
}

impl From<rusqlite::types::FromSqlError> for DbError {
    fn from(err: rusqlite::types::FromSqlError) -> Self {
        DbError::Sqlite(rusqlite::Error::from(err))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Serialized row value: a full snapshot of the record, including the
/// derived token total.
#[derive(Debug, Serialize, Deserialize)]
struct RecordSnapshot {
    session_id: String,
    timestamp: String,
    model: String,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_creation_tokens: u64,
    total_tokens: u64,
    cost_usd: f64,
    duration_ms: u64,
}

impl RecordSnapshot {
    fn from_record(record: &UsageRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            timestamp: encode_timestamp(record.timestamp),
            model: record.model.clone(),
            input_tokens: record.tokens.input,
            output_tokens: record.tokens.output,
            cache_read_tokens: record.tokens.cache_read,
            cache_creation_tokens: record.tokens.cache_creation,
            total_tokens: record.tokens.total(),
            cost_usd: record.cost_usd,
            duration_ms: record.duration_ms,
        }
    }

    fn into_record(self) -> Option<UsageRecord> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()?
            .with_timezone(&Utc);
        Some(UsageRecord {
            session_id: self.session_id,
            timestamp,
            model: self.model,
            tokens: TokenCounts::new(
                self.input_tokens,
                self.output_tokens,
                self.cache_read_tokens,
                self.cache_creation_tokens,
            ),
            cost_usd: self.cost_usd,
            duration_ms: self.duration_ms,
        })
    }
}

/// Fixed-width, lexicographically sortable timestamp encoding. Nanosecond
/// precision keeps key order identical to chronological order.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn record_key(ts: DateTime<Utc>, session_id: &str) -> String {
    format!("{}{}{}", encode_timestamp(ts), KEY_SEPARATOR, session_id)
}

fn range_end_boundary(end: DateTime<Utc>) -> String {
    format!("{}{}", encode_timestamp(end), RANGE_END_SENTINEL)
}

#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;
        Ok(Self { conn })
    }

    /// Read-only deployments require the database to already exist; a
    /// missing file is a startup error, not something to create silently.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DbError::MissingDatabase(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    fn apply_pragmas(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (_name, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Persist one record. A duplicate (timestamp, session) key silently
    /// overwrites the previous value.
    pub fn append(&mut self, record: &UsageRecord) -> Result<()> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Persist a batch inside a single transaction; all keys commit or
    /// none do.
    pub fn append_batch(&mut self, records: &[UsageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO usage_record (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )?;
            for record in records {
                let key = record_key(record.timestamp, &record.session_id);
                let value = serde_json::to_string(&RecordSnapshot::from_record(record))?;
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Records with `start <= timestamp <= end`, in chronological order
    /// with session-id tie-break.
    pub fn range_query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT key, value FROM usage_record
            WHERE key >= ?1 AND key < ?2
            ORDER BY key ASC
            "#,
        )?;
        let mut rows = stmt.query(params![encode_timestamp(start), range_end_boundary(end)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = decode_row(row.get_ref(0)?.as_str()?, row.get_ref(1)?.as_str()?) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// All records, capped at the most recent `SCAN_CAP`. The cap bounds
    /// read memory only; older records stay on disk.
    pub fn scan_all(&self) -> Result<Vec<UsageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT key, value FROM usage_record
            ORDER BY key DESC
            LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![SCAN_CAP as i64])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = decode_row(row.get_ref(0)?.as_str()?, row.get_ref(1)?.as_str()?) {
                records.push(record);
            }
        }
        records.reverse();
        Ok(records)
    }

    /// Delete every record stamped strictly before `cutoff`. A record at
    /// exactly `cutoff` is retained. Returns the exact count removed.
    pub fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM usage_record WHERE key < ?1",
            params![encode_timestamp(cutoff)],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    pub fn count_records(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM usage_record", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|value| value as u64)
            .map_err(DbError::from)
    }
}

/// Corrupt rows degrade completeness, not availability: an undecodable
/// value is skipped and the scan continues.
fn decode_row(key: &str, value: &str) -> Option<UsageRecord> {
    match serde_json::from_str::<RecordSnapshot>(value) {
        Ok(snapshot) => match snapshot.into_record() {
            Some(record) => Some(record),
            None => {
                tracing::debug!(key, "skipping record with unreadable timestamp");
                None
            }
        },
        Err(err) => {
            tracing::debug!(key, error = %err, "skipping undecodable record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_encoding_is_fixed_width_nanos() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(encode_timestamp(ts), "2025-06-01T10:00:00.000000000Z");
    }

    #[test]
    fn key_order_follows_time_regardless_of_session() {
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 1).unwrap();
        assert!(record_key(t1, "zzz") < record_key(t2, "aaa"));
    }

    #[test]
    fn same_timestamp_orders_by_session_id() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert!(record_key(ts, "a") < record_key(ts, "b"));
    }

    #[test]
    fn range_end_boundary_sorts_after_all_sessions_at_end() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let boundary = range_end_boundary(ts);
        assert!(record_key(ts, "any-session") < boundary);
        let next = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 1).unwrap();
        assert!(boundary < record_key(next, "a"));
    }
}
