//! End-to-end tests over the SQLite-backed pipeline

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use motion_flux::{
    extract_features, DeviceDescriptor, NewSession, PipelineConfig, Side, SqliteStore,
    WearableError, WearablePipeline, WearableStore, FEATURE_SCHEMA_VERSION,
};

fn window(window_ts: &str, spike: f64) -> String {
    format!(
        r#"{{"windowTs": "{window_ts}", "samples": [{{"ts": 0, "ax": 0, "ay": 2, "az": 9.8, "gx": 0, "gy": 0, "gz": 0.1}}, {{"ts": 16, "ax": 0, "ay": 2, "az": {spike}, "gx": 0, "gy": 0, "gz": 0.3}}]}}"#
    )
}

fn sqlite_pipeline() -> (WearablePipeline, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pipeline = WearablePipeline::new(PipelineConfig::default(), store.clone());
    (pipeline, store)
}

#[test]
fn test_session_lifecycle_end_to_end() {
    let (pipeline, _) = sqlite_pipeline();
    let mut request = NewSession::new("athlete-7", "drop_jump");
    request.surface = Some("turf".to_string());
    request.devices = vec![DeviceDescriptor {
        id: Some("imu-l".to_string()),
        device_type: "shank_imu".to_string(),
        side: Some(Side::Left),
        ..Default::default()
    }];

    let session = pipeline.start_session(request).unwrap();
    assert_eq!(session.device_ids, vec!["imu-l".to_string()]);
    assert!(session.is_open());

    let outcome = pipeline
        .ingest_raw(&session.id, &format!("[{}]", window("2024-03-01T10:00:00Z", 20.0)))
        .unwrap();
    assert_eq!(outcome.features.len(), 1);
    assert_eq!(outcome.features[0].contact_ms, Some(16));

    let flushed = pipeline.flush(&session.id).unwrap();
    assert!(flushed.ended_at.is_some());

    let stored = pipeline.list_features(&session.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].schema_version, FEATURE_SCHEMA_VERSION);
    assert_eq!(stored[0].session_id, session.id);
    assert_eq!(stored[0].feature.contact_ms, Some(16));
    assert_eq!(stored[0].feature.window_ts, outcome.features[0].window_ts);
    assert_eq!(stored[0].feature.meta.sample_count, 2);
}

#[test]
fn test_features_listed_in_window_order_across_batches() {
    let (pipeline, _) = sqlite_pipeline();
    let session = pipeline
        .start_session(NewSession::new("athlete-7", "cut"))
        .unwrap();

    pipeline
        .ingest_raw(&session.id, &window("2024-03-01T10:00:02Z", 20.0))
        .unwrap();
    pipeline
        .ingest_raw(
            &session.id,
            &format!(
                "{}\n{}\n",
                window("2024-03-01T10:00:00Z", 22.0),
                window("2024-03-01T10:00:01Z", 24.0)
            ),
        )
        .unwrap();

    let times: Vec<_> = pipeline
        .list_features(&session.id)
        .unwrap()
        .into_iter()
        .map(|r| r.feature.window_ts)
        .collect();
    assert_eq!(
        times,
        vec![
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 1).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 2).unwrap(),
        ]
    );

    let recent = pipeline.recent_features(&session.id, Some(2)).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(
        recent[1].feature.window_ts,
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 2).unwrap()
    );
}

#[test]
fn test_malformed_lines_do_not_abort_batch() {
    let (pipeline, _) = sqlite_pipeline();
    let session = pipeline
        .start_session(NewSession::new("athlete-7", "drop_jump"))
        .unwrap();

    let raw = format!(
        "{}\nnot json\n{}\n",
        window("2024-03-01T10:00:00Z", 20.0),
        window("2024-03-01T10:00:01Z", 21.0)
    );
    let outcome = pipeline.ingest_raw(&session.id, &raw).unwrap();

    assert_eq!(outcome.features.len(), 2);
    assert_eq!(pipeline.list_features(&session.id).unwrap().len(), 2);
}

#[test]
fn test_flushed_session_rejects_ingest_and_keeps_features() {
    let (pipeline, store) = sqlite_pipeline();
    let session = pipeline
        .start_session(NewSession::new("athlete-7", "drop_jump"))
        .unwrap();
    pipeline
        .ingest_raw(&session.id, &window("2024-03-01T10:00:00Z", 20.0))
        .unwrap();
    pipeline.flush(&session.id).unwrap();

    let result = pipeline.ingest_raw(&session.id, &window("2024-03-01T10:00:01Z", 20.0));

    assert!(matches!(result, Err(WearableError::SessionClosed(_))));
    assert_eq!(store.list_features(&session.id).unwrap().len(), 1);
}

#[test]
fn test_unknown_session_is_rejected() {
    let (pipeline, store) = sqlite_pipeline();

    let result = pipeline.ingest_raw("no-such-session", &window("2024-03-01T10:00:00Z", 20.0));

    assert!(matches!(result, Err(WearableError::SessionNotFound(_))));
    assert!(store.list_features("no-such-session").unwrap().is_empty());
}

#[test]
fn test_athlete_history_spans_sessions() {
    let (pipeline, _) = sqlite_pipeline();
    let first = pipeline
        .start_session(NewSession::new("athlete-7", "drop_jump"))
        .unwrap();
    let second = pipeline
        .start_session(NewSession::new("athlete-7", "cut"))
        .unwrap();
    let other = pipeline
        .start_session(NewSession::new("athlete-8", "cut"))
        .unwrap();

    pipeline
        .ingest_raw(&first.id, &window("2024-03-01T10:00:00Z", 20.0))
        .unwrap();
    pipeline
        .ingest_raw(&second.id, &window("2024-03-02T10:00:00Z", 20.0))
        .unwrap();
    pipeline
        .ingest_raw(&other.id, &window("2024-03-03T10:00:00Z", 20.0))
        .unwrap();

    let history = pipeline
        .recent_athlete_features("athlete-7", Some(10))
        .unwrap();
    let sessions: Vec<_> = history.iter().map(|r| r.session_id.clone()).collect();
    assert_eq!(sessions, vec![first.id, second.id]);
}

#[test]
fn test_stateless_extract_matches_ingested_feature() {
    let (pipeline, _) = sqlite_pipeline();
    let session = pipeline
        .start_session(NewSession::new("athlete-7", "drop_jump"))
        .unwrap();
    let raw = window("2024-03-01T10:00:00Z", 20.0);

    let direct = extract_features(&raw).unwrap();
    let ingested = pipeline.ingest_raw(&session.id, &raw).unwrap();

    assert_eq!(direct, ingested.features);
}
