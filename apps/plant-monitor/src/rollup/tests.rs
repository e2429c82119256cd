use super::{Resolution, RollupEngine, RollupService};
use crate::aggregate_log::AggregateLog;
use crate::channels::{ChannelSet, Sample, SENTINEL};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use std::fs;
use tempfile::TempDir;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

fn uniform(value: i64) -> Sample {
    Sample::new(vec![value; 4])
}

fn channels() -> ChannelSet {
    ChannelSet::parse("moist1=plant1,moist2=plant2,moist3=plant3,moist4=plant4").unwrap()
}

#[test]
fn second_window_stabilizes_at_capacity() {
    let mut engine = RollupEngine::new(4);
    let start = at(2025, 6, 1, 10, 0, 0);
    for i in 0..150i64 {
        engine.ingest(&uniform(i), start + ChronoDuration::seconds(i));
    }
    let snapshot = engine.snapshot(Resolution::Second);
    assert_eq!(snapshot.len(), 4);
    for window in snapshot {
        assert_eq!(window, (90..150).collect::<Vec<i64>>());
    }
}

#[test]
fn late_sample_fills_missing_seconds_with_sentinel() {
    let mut engine = RollupEngine::new(4);
    let t0 = at(2025, 6, 1, 10, 0, 10);
    engine.ingest(&uniform(7), t0);
    let outcome = engine.ingest(&uniform(7), t0 + ChronoDuration::seconds(5));

    assert_eq!(outcome.gap_ticks, 4);
    assert_eq!(
        engine.snapshot(Resolution::Second)[0],
        vec![7, SENTINEL, SENTINEL, SENTINEL, SENTINEL, 7]
    );
}

#[test]
fn clock_going_backwards_adds_no_gap() {
    let mut engine = RollupEngine::new(4);
    let t0 = at(2025, 6, 1, 10, 0, 10);
    engine.ingest(&uniform(1), t0);
    let outcome = engine.ingest(&uniform(2), t0 - ChronoDuration::seconds(3));
    assert_eq!(outcome.gap_ticks, 0);
    assert_eq!(engine.snapshot(Resolution::Second)[0], vec![1, 2]);
}

#[test]
fn first_sample_only_seeds_boundaries() {
    let mut engine = RollupEngine::new(4);
    let outcome = engine.ingest(&uniform(5), at(2025, 6, 1, 23, 59, 59));
    assert!(!outcome.minute_rolled);
    assert!(outcome.rows.is_empty());
    assert!(engine.snapshot(Resolution::Minute)[0].is_empty());
}

#[test]
fn minute_boundary_does_not_roll_hour() {
    let mut engine = RollupEngine::new(4);
    engine.ingest(&uniform(10), at(2025, 6, 1, 12, 0, 58));
    engine.ingest(&uniform(20), at(2025, 6, 1, 12, 0, 59));
    let outcome = engine.ingest(&uniform(30), at(2025, 6, 1, 12, 1, 0));

    assert!(outcome.minute_rolled);
    assert!(outcome.rows.is_empty());
    for window in engine.snapshot(Resolution::Minute) {
        assert_eq!(window, vec![20]);
    }
    assert!(engine
        .snapshot(Resolution::Hour)
        .iter()
        .all(|window| window.is_empty()));
}

#[test]
fn minute_average_ignores_missing_readings() {
    let mut engine = RollupEngine::new(2);
    engine.ingest(&Sample::new(vec![5, 8]), at(2025, 6, 1, 12, 0, 57));
    engine.ingest(&Sample::new(vec![SENTINEL, SENTINEL]), at(2025, 6, 1, 12, 0, 58));
    engine.ingest(&Sample::new(vec![15]), at(2025, 6, 1, 12, 0, 59));
    engine.ingest(&Sample::new(vec![100]), at(2025, 6, 1, 12, 1, 0));

    let minutes = engine.snapshot(Resolution::Minute);
    assert_eq!(minutes[0], vec![40]);
    assert_eq!(minutes[1], vec![8]);
}

#[test]
fn midnight_emits_hourly_then_daily_row() {
    let mut engine = RollupEngine::new(4);
    engine.ingest(&uniform(42), at(2025, 6, 1, 23, 59, 59));
    let outcome = engine.ingest(&uniform(42), at(2025, 6, 2, 0, 0, 0));

    assert!(outcome.minute_rolled);
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(outcome.rows[0].resolution, Resolution::Hour);
    assert_eq!(outcome.rows[0].label, "2025-06-02 00:00");
    assert_eq!(outcome.rows[0].values, vec![42; 4]);
    assert_eq!(outcome.rows[1].resolution, Resolution::Day);
    assert_eq!(outcome.rows[1].label, "2025-06-02");
    assert_eq!(engine.snapshot(Resolution::Day)[3], vec![42]);
}

#[test]
fn silent_hours_are_not_backfilled() {
    let mut engine = RollupEngine::new(4);
    engine.ingest(&uniform(9), at(2025, 6, 1, 10, 0, 0));
    let outcome = engine.ingest(&uniform(12), at(2025, 6, 1, 13, 30, 0));

    // Three hours passed, but only one hourly row exists for the whole silent stretch.
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].label, "2025-06-01 13:00");
    assert_eq!(outcome.rows[0].values, vec![12; 4]);
    let seconds = &engine.snapshot(Resolution::Second)[0];
    assert_eq!(seconds.len(), 60);
    assert!(seconds[..59].iter().all(|v| *v == SENTINEL));
}

#[test]
fn new_day_at_same_hour_emits_no_daily_row() {
    let mut engine = RollupEngine::new(4);
    engine.ingest(&uniform(3), at(2025, 6, 1, 10, 5, 0));
    // The day check only runs once the hour field changes, so this day is never closed.
    let outcome = engine.ingest(&uniform(4), at(2025, 6, 2, 10, 6, 0));

    assert!(outcome.minute_rolled);
    assert!(outcome.rows.is_empty());
    assert!(engine
        .snapshot(Resolution::Day)
        .iter()
        .all(|window| window.is_empty()));

    // The next hour change closes both the hour and the day.
    let outcome = engine.ingest(&uniform(5), at(2025, 6, 2, 11, 0, 0));
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(outcome.rows[1].label, "2025-06-02");
}

#[test]
fn rollover_keys_off_calendar_fields_not_elapsed_time() {
    let mut engine = RollupEngine::new(4);
    engine.ingest(&uniform(1), at(2025, 6, 1, 10, 5, 0));
    // Exactly one hour later the minute field is unchanged, so nothing rolls.
    let outcome = engine.ingest(&uniform(2), at(2025, 6, 1, 11, 5, 0));
    assert!(!outcome.minute_rolled);
    assert!(outcome.rows.is_empty());
}

#[tokio::test]
async fn service_persists_hourly_rows_under_lock() {
    let dir = TempDir::new().unwrap();
    let channels = channels();
    let hourly = AggregateLog::new(dir.path().join("logs/hourly_log.csv"), "datetime", &channels);
    let daily = AggregateLog::new(dir.path().join("logs/daily_log.csv"), "date", &channels);
    let service = RollupService::new(channels, hourly, daily);

    service
        .ingest_at(&uniform(50), at(2025, 6, 1, 10, 59, 59))
        .await
        .unwrap();
    let outcome = service
        .ingest_at(&uniform(60), at(2025, 6, 1, 11, 0, 0))
        .await
        .unwrap();
    assert_eq!(outcome.rows.len(), 1);

    let contents = fs::read_to_string(dir.path().join("logs/hourly_log.csv")).unwrap();
    assert_eq!(
        contents,
        "datetime,plant1,plant2,plant3,plant4\n2025-06-01 11:00,55,55,55,55\n"
    );
    assert!(!dir.path().join("logs/daily_log.csv").exists());
    assert_eq!(service.latest().await, vec![60; 4]);
}

#[tokio::test]
async fn failed_log_write_keeps_memory_update() {
    let dir = TempDir::new().unwrap();
    let channels = channels();
    // A directory cannot be opened for append.
    let hourly = AggregateLog::new(dir.path(), "datetime", &channels);
    let daily = AggregateLog::new(dir.path().join("daily_log.csv"), "date", &channels);
    let service = RollupService::new(channels, hourly, daily);

    service
        .ingest_at(&uniform(1), at(2025, 6, 1, 10, 59, 59))
        .await
        .unwrap();
    let result = service
        .ingest_at(&uniform(3), at(2025, 6, 1, 11, 0, 0))
        .await;
    assert!(result.is_err());

    let hours = service.snapshot(Resolution::Hour).await;
    assert_eq!(hours[0], vec![2]);
}

#[tokio::test]
async fn clear_log_resets_to_header() {
    let dir = TempDir::new().unwrap();
    let channels = channels();
    let hourly = AggregateLog::new(dir.path().join("hourly_log.csv"), "datetime", &channels);
    let daily = AggregateLog::new(dir.path().join("daily_log.csv"), "date", &channels);
    let service = RollupService::new(channels, hourly, daily);

    service
        .log(Resolution::Hour)
        .unwrap()
        .append("2025-06-01 11:00", &[1, 2, 3, 4])
        .unwrap();
    service.clear_log(Resolution::Hour).await.unwrap();
    service.clear_log(Resolution::Second).await.unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("hourly_log.csv")).unwrap(),
        "datetime,plant1,plant2,plant3,plant4\n"
    );
}
