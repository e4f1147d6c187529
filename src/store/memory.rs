//! In-process store
//!
//! Keeps everything in maps behind `RwLock`s. Useful for embedding the pipeline in a
//! host that persists records itself, and for tests.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{merge_device, take_last, WearableStore};
use crate::error::WearableError;
use crate::types::{FeatureRecord, WearableDevice, WearableFeature, WearableSession};

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, WearableSession>>,
    /// Features per session, kept in insertion order
    features: RwLock<HashMap<String, Vec<FeatureRecord>>>,
    devices: RwLock<HashMap<String, WearableDevice>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, WearableError> {
    lock.read()
        .map_err(|_| WearableError::Storage("store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, WearableError> {
    lock.write()
        .map_err(|_| WearableError::Storage("store lock poisoned".to_string()))
}

/// Sort by window time; the sort is stable so insertion order breaks ties
fn ordered(mut records: Vec<FeatureRecord>) -> Vec<FeatureRecord> {
    records.sort_by_key(|r| r.feature.window_ts);
    records
}

impl WearableStore for MemoryStore {
    fn insert_session(&self, session: &WearableSession) -> Result<(), WearableError> {
        let mut sessions = write(&self.sessions)?;
        if sessions.contains_key(&session.id) {
            return Err(WearableError::Storage(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<WearableSession>, WearableError> {
        Ok(read(&self.sessions)?.get(session_id).cloned())
    }

    fn mark_session_ended(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<WearableSession>, WearableError> {
        let mut sessions = write(&self.sessions)?;
        Ok(sessions.get_mut(session_id).map(|session| {
            session.ended_at = Some(ended_at);
            session.updated_at = ended_at;
            session.clone()
        }))
    }

    fn touch_session(
        &self,
        session_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), WearableError> {
        if let Some(session) = write(&self.sessions)?.get_mut(session_id) {
            session.updated_at = updated_at;
        }
        Ok(())
    }

    fn append_features(
        &self,
        session_id: &str,
        features: &[WearableFeature],
    ) -> Result<(), WearableError> {
        let mut all = write(&self.features)?;
        all.entry(session_id.to_string())
            .or_default()
            .extend(features.iter().map(|f| FeatureRecord::new(session_id, f.clone())));
        Ok(())
    }

    fn list_features(&self, session_id: &str) -> Result<Vec<FeatureRecord>, WearableError> {
        let all = read(&self.features)?;
        Ok(ordered(all.get(session_id).cloned().unwrap_or_default()))
    }

    fn recent_features(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        Ok(take_last(self.list_features(session_id)?, limit))
    }

    fn recent_athlete_features(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        let mut session_ids: Vec<String> = read(&self.sessions)?
            .values()
            .filter(|s| s.athlete_id == athlete_id)
            .map(|s| s.id.clone())
            .collect();
        // Deterministic tie order across sessions
        session_ids.sort();

        let all = read(&self.features)?;
        let records = session_ids
            .iter()
            .filter_map(|id| all.get(id))
            .flat_map(|records| records.iter().cloned())
            .collect();
        Ok(take_last(ordered(records), limit))
    }

    fn upsert_device(&self, device: &WearableDevice) -> Result<WearableDevice, WearableError> {
        let mut devices = write(&self.devices)?;
        let merged = merge_device(devices.get(&device.id), device);
        devices.insert(merged.id.clone(), merged.clone());
        Ok(merged)
    }

    fn get_device(&self, device_id: &str) -> Result<Option<WearableDevice>, WearableError> {
        Ok(read(&self.devices)?.get(device_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{datetime_from_millis, FeatureMeta};

    fn feature(window_ms: i64) -> WearableFeature {
        WearableFeature {
            window_ts: datetime_from_millis(window_ms),
            contact_ms: None,
            stability_ms: None,
            valgus_idx: Some(0),
            asymmetry_pct: None,
            yaw_spike: Some(0.0),
            confidence: Some(0.5),
            meta: FeatureMeta {
                sample_count: 10,
                sample_interval_ms: 16.0,
                window_duration_ms: 144,
                side: None,
            },
        }
    }

    #[test]
    fn test_list_orders_by_window_then_insertion() {
        let store = MemoryStore::new();
        store
            .append_features("s-1", &[feature(300), feature(100)])
            .unwrap();
        store.append_features("s-1", &[feature(200)]).unwrap();

        let windows: Vec<i64> = store
            .list_features("s-1")
            .unwrap()
            .iter()
            .map(|r| r.feature.window_ts.timestamp_millis())
            .collect();
        assert_eq!(windows, vec![100, 200, 300]);
        assert_eq!(store.recent_features("s-1", 2).unwrap().len(), 2);
        assert!(store.list_features("unknown").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .append_features("s-1", &[feature(t * 1000 + i)])
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list_features("s-1").unwrap().len(), 100);
    }
}
