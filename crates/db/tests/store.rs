use chrono::{DateTime, Duration, TimeZone, Utc};
use monitor_core::{TokenCounts, UsageRecord};
use monitor_db::{Db, SCAN_CAP, record_key};

struct TestDb {
    db: Db,
    _dir: tempfile::TempDir,
    path: std::path::PathBuf,
}

fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("monitor.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate");
    TestDb {
        db,
        _dir: dir,
        path,
    }
}

fn make_record(session: &str, ts: DateTime<Utc>, model: &str) -> UsageRecord {
    UsageRecord {
        session_id: session.to_string(),
        timestamp: ts,
        model: model.to_string(),
        tokens: TokenCounts::new(100, 50, 10, 5),
        cost_usd: 0.01,
        duration_ms: 250,
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
}

#[test]
fn appended_records_appear_exactly_once_in_range() {
    let mut test = setup_db();
    let records = vec![
        make_record("s1", at(10, 0, 0), "claude-sonnet-4-5"),
        make_record("s2", at(10, 5, 0), "claude-haiku-4-5"),
        make_record("s3", at(10, 10, 0), "claude-opus-4"),
    ];
    for record in &records {
        test.db.append(record).expect("append");
    }

    let found = test
        .db
        .range_query(at(10, 0, 0), at(11, 0, 0))
        .expect("range");
    assert_eq!(found, records);
}

#[test]
fn range_includes_records_stamped_exactly_at_end() {
    let mut test = setup_db();
    let boundary = make_record("s-end", at(11, 0, 0), "claude-opus-4");
    test.db.append(&boundary).expect("append");
    test.db
        .append(&make_record("s-late", at(11, 0, 1), "claude-opus-4"))
        .expect("append");

    let found = test
        .db
        .range_query(at(10, 0, 0), at(11, 0, 0))
        .expect("range");
    assert_eq!(found, vec![boundary]);
}

#[test]
fn range_orders_same_timestamp_records_by_session() {
    let mut test = setup_db();
    let b = make_record("b", at(10, 0, 0), "claude-opus-4");
    let a = make_record("a", at(10, 0, 0), "claude-opus-4");
    test.db.append(&b).expect("append");
    test.db.append(&a).expect("append");

    let found = test
        .db
        .range_query(at(9, 0, 0), at(11, 0, 0))
        .expect("range");
    assert_eq!(found, vec![a, b]);
}

#[test]
fn duplicate_key_silently_overwrites() {
    let mut test = setup_db();
    let mut record = make_record("s1", at(10, 0, 0), "claude-opus-4");
    test.db.append(&record).expect("append");
    record.cost_usd = 0.5;
    test.db.append(&record).expect("append again");

    let found = test
        .db
        .range_query(at(9, 0, 0), at(11, 0, 0))
        .expect("range");
    assert_eq!(found.len(), 1);
    assert!((found[0].cost_usd - 0.5).abs() < 1e-12);
}

#[test]
fn delete_older_than_is_exclusive_below() {
    let mut test = setup_db();
    test.db
        .append_batch(&[
            make_record("s1", at(9, 0, 0), "claude-opus-4"),
            make_record("s2", at(9, 30, 0), "claude-opus-4"),
            make_record("s3", at(10, 0, 0), "claude-opus-4"),
            make_record("s4", at(10, 30, 0), "claude-opus-4"),
        ])
        .expect("append batch");

    let deleted = test.db.delete_older_than(at(10, 0, 0)).expect("delete");
    assert_eq!(deleted, 2);

    let remaining = test.db.scan_all().expect("scan");
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].timestamp, at(10, 0, 0));
}

#[test]
fn scan_all_caps_at_most_recent_records() {
    let mut test = setup_db();
    let base = at(0, 0, 0);
    let records: Vec<UsageRecord> = (0..SCAN_CAP + 25)
        .map(|i| make_record("s", base + Duration::seconds(i as i64), "claude-opus-4"))
        .collect();
    test.db.append_batch(&records).expect("append batch");

    let scanned = test.db.scan_all().expect("scan");
    assert_eq!(scanned.len(), SCAN_CAP);
    // The oldest 25 are skipped at read time, not removed.
    assert_eq!(scanned[0].timestamp, base + Duration::seconds(25));
    assert_eq!(test.db.count_records().expect("count"), (SCAN_CAP + 25) as u64);
}

#[test]
fn corrupt_rows_are_skipped_not_fatal() {
    let mut test = setup_db();
    test.db
        .append(&make_record("s1", at(10, 0, 0), "claude-opus-4"))
        .expect("append");

    let conn = rusqlite::Connection::open(&test.path).expect("raw conn");
    conn.execute(
        "INSERT INTO usage_record (key, value) VALUES (?1, ?2)",
        rusqlite::params![record_key(at(10, 1, 0), "s-bad"), "{not json"],
    )
    .expect("insert corrupt row");
    drop(conn);

    let found = test
        .db
        .range_query(at(9, 0, 0), at(11, 0, 0))
        .expect("range");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].session_id, "s1");
}

#[test]
fn read_only_open_requires_existing_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.sqlite");
    let err = Db::open_read_only(&missing).expect_err("should fail");
    assert!(err.to_string().contains("not found"));
}

#[test]
fn read_only_handle_serves_queries() {
    let test = setup_db();
    let mut db = test.db;
    db.append(&make_record("s1", at(10, 0, 0), "claude-opus-4"))
        .expect("append");
    drop(db);

    let ro = Db::open_read_only(&test.path).expect("open read-only");
    let found = ro.range_query(at(9, 0, 0), at(11, 0, 0)).expect("range");
    assert_eq!(found.len(), 1);
}
