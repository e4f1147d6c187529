//! SQLite-backed store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::migrations::run_migrations;
use super::{merge_device, WearableStore};
use crate::error::WearableError;
use crate::types::{
    FeatureMeta, FeatureRecord, Side, WearableDevice, WearableFeature, WearableSession,
    FEATURE_SCHEMA_VERSION,
};

const SESSION_COLUMNS: &str = "id, athlete_id, drill_type, device_ids, surface, temp_f, \
     humidity_pct, started_at, ended_at, created_at, updated_at";

const FEATURE_COLUMNS: &str = "f.session_id, f.schema_version, f.window_ts, f.contact_ms, \
     f.stability_ms, f.valgus_idx, f.asymmetry_pct, f.yaw_spike, f.confidence, f.meta";

/// Store persisting sessions, features and devices in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (and migrate) a database file, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WearableError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                WearableError::Storage(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut conn = Connection::open(&path)?;
        if let Err(err) = conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(())) {
            warn!("Failed to enable WAL mode: {err}");
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&mut conn)?;

        info!("Wearable store opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, WearableError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, WearableError> {
        self.conn
            .lock()
            .map_err(|_| WearableError::Storage("connection lock poisoned".to_string()))
    }
}

impl WearableStore for SqliteStore {
    fn insert_session(&self, session: &WearableSession) -> Result<(), WearableError> {
        let device_ids = serde_json::to_string(&session.device_ids)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO wearable_sessions (id, athlete_id, drill_type, device_ids, surface, temp_f,
                 humidity_pct, started_at, ended_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.id,
                session.athlete_id,
                session.drill_type,
                device_ids,
                session.surface,
                session.temp_f,
                session.humidity_pct,
                session.started_at.to_rfc3339(),
                session.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<WearableSession>, WearableError> {
        let conn = self.lock()?;
        load_session(&conn, session_id)
    }

    fn mark_session_ended(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<WearableSession>, WearableError> {
        let conn = self.lock()?;
        let stamp = ended_at.to_rfc3339();
        let changed = conn.execute(
            "UPDATE wearable_sessions SET ended_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![stamp, session_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        load_session(&conn, session_id)
    }

    fn touch_session(
        &self,
        session_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), WearableError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE wearable_sessions SET updated_at = ?1 WHERE id = ?2",
            params![updated_at.to_rfc3339(), session_id],
        )?;
        Ok(())
    }

    fn append_features(
        &self,
        session_id: &str,
        features: &[WearableFeature],
    ) -> Result<(), WearableError> {
        if features.is_empty() {
            return Ok(());
        }

        let created_at = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO wearable_features (session_id, schema_version, window_ts_ms, window_ts,
                     contact_ms, stability_ms, valgus_idx, asymmetry_pct, yaw_spike, confidence,
                     meta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for feature in features {
                stmt.execute(params![
                    session_id,
                    FEATURE_SCHEMA_VERSION,
                    feature.window_ts.timestamp_millis(),
                    feature.window_ts.to_rfc3339(),
                    feature.contact_ms,
                    feature.stability_ms,
                    feature.valgus_idx,
                    feature.asymmetry_pct,
                    feature.yaw_spike,
                    feature.confidence,
                    serde_json::to_string(&feature.meta)?,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_features(&self, session_id: &str) -> Result<Vec<FeatureRecord>, WearableError> {
        let conn = self.lock()?;
        query_features(
            &conn,
            &format!(
                "SELECT {FEATURE_COLUMNS} FROM wearable_features f
                 WHERE f.session_id = ?1
                 ORDER BY f.window_ts_ms ASC, f.id ASC"
            ),
            params![session_id],
        )
    }

    fn recent_features(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        let conn = self.lock()?;
        let mut records = query_features(
            &conn,
            &format!(
                "SELECT {FEATURE_COLUMNS} FROM wearable_features f
                 WHERE f.session_id = ?1
                 ORDER BY f.window_ts_ms DESC, f.id DESC
                 LIMIT ?2"
            ),
            params![session_id, sql_limit(limit)],
        )?;
        records.reverse();
        Ok(records)
    }

    fn recent_athlete_features(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        let conn = self.lock()?;
        let mut records = query_features(
            &conn,
            &format!(
                "SELECT {FEATURE_COLUMNS} FROM wearable_features f
                 JOIN wearable_sessions s ON s.id = f.session_id
                 WHERE s.athlete_id = ?1
                 ORDER BY f.window_ts_ms DESC, f.id DESC
                 LIMIT ?2"
            ),
            params![athlete_id, sql_limit(limit)],
        )?;
        records.reverse();
        Ok(records)
    }

    fn upsert_device(&self, device: &WearableDevice) -> Result<WearableDevice, WearableError> {
        let conn = self.lock()?;
        let existing = load_device(&conn, &device.id)?;
        let merged = merge_device(existing.as_ref(), device);

        conn.execute(
            "INSERT INTO wearable_devices (id, device_type, side, nickname, athlete_id, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 device_type = excluded.device_type,
                 side = excluded.side,
                 nickname = excluded.nickname,
                 athlete_id = excluded.athlete_id,
                 last_seen_at = excluded.last_seen_at",
            params![
                merged.id,
                merged.device_type,
                merged.side.map(|s| s.as_str()),
                merged.nickname,
                merged.athlete_id,
                merged.last_seen_at.to_rfc3339(),
            ],
        )?;
        Ok(merged)
    }

    fn get_device(&self, device_id: &str) -> Result<Option<WearableDevice>, WearableError> {
        let conn = self.lock()?;
        load_device(&conn, device_id)
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, WearableError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| WearableError::Storage(format!("invalid datetime '{value}': {err}")))
}

fn parse_side(value: Option<String>) -> Result<Option<Side>, WearableError> {
    match value {
        None => Ok(None),
        Some(text) => Side::parse(&text)
            .map(Some)
            .ok_or_else(|| WearableError::Storage(format!("unknown side '{text}'"))),
    }
}

fn load_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<WearableSession>, WearableError> {
    let row = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM wearable_sessions WHERE id = ?1"),
            params![session_id],
            SessionRow::from_row,
        )
        .optional()?;
    row.map(SessionRow::into_session).transpose()
}

fn load_device(conn: &Connection, device_id: &str) -> Result<Option<WearableDevice>, WearableError> {
    let row = conn
        .query_row(
            "SELECT id, device_type, side, nickname, athlete_id, last_seen_at
             FROM wearable_devices WHERE id = ?1",
            params![device_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, device_type, side, nickname, athlete_id, last_seen_at)| {
        Ok(WearableDevice {
            id,
            device_type,
            side: parse_side(side)?,
            nickname,
            athlete_id,
            last_seen_at: parse_datetime(&last_seen_at)?,
        })
    })
    .transpose()
}

fn query_features<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<FeatureRecord>, WearableError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, FeatureRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(FeatureRow::into_record).collect()
}

struct SessionRow {
    id: String,
    athlete_id: String,
    drill_type: String,
    device_ids: String,
    surface: Option<String>,
    temp_f: Option<f64>,
    humidity_pct: Option<f64>,
    started_at: String,
    ended_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            athlete_id: row.get(1)?,
            drill_type: row.get(2)?,
            device_ids: row.get(3)?,
            surface: row.get(4)?,
            temp_f: row.get(5)?,
            humidity_pct: row.get(6)?,
            started_at: row.get(7)?,
            ended_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_session(self) -> Result<WearableSession, WearableError> {
        Ok(WearableSession {
            id: self.id,
            athlete_id: self.athlete_id,
            drill_type: self.drill_type,
            device_ids: serde_json::from_str(&self.device_ids)?,
            surface: self.surface,
            temp_f: self.temp_f,
            humidity_pct: self.humidity_pct,
            started_at: parse_datetime(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_datetime).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct FeatureRow {
    session_id: String,
    schema_version: String,
    window_ts: String,
    contact_ms: Option<i64>,
    stability_ms: Option<i64>,
    valgus_idx: Option<i64>,
    asymmetry_pct: Option<f64>,
    yaw_spike: Option<f64>,
    confidence: Option<f64>,
    meta: String,
}

impl FeatureRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            schema_version: row.get(1)?,
            window_ts: row.get(2)?,
            contact_ms: row.get(3)?,
            stability_ms: row.get(4)?,
            valgus_idx: row.get(5)?,
            asymmetry_pct: row.get(6)?,
            yaw_spike: row.get(7)?,
            confidence: row.get(8)?,
            meta: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<FeatureRecord, WearableError> {
        let meta: FeatureMeta = serde_json::from_str(&self.meta)?;
        let valgus_idx = self
            .valgus_idx
            .map(|v| {
                u8::try_from(v)
                    .map_err(|_| WearableError::Storage(format!("valgus index out of range: {v}")))
            })
            .transpose()?;

        Ok(FeatureRecord {
            schema_version: self.schema_version,
            session_id: self.session_id,
            feature: WearableFeature {
                window_ts: parse_datetime(&self.window_ts)?,
                contact_ms: self.contact_ms,
                stability_ms: self.stability_ms,
                valgus_idx,
                asymmetry_pct: self.asymmetry_pct,
                yaw_spike: self.yaw_spike,
                confidence: self.confidence,
                meta,
            },
        })
    }
}
