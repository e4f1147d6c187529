//! Session, feature and device persistence
//!
//! Features are append-only: they are inserted per session and never updated in
//! place, so concurrent batches for the same session never conflict.

mod memory;
mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::WearableError;
use crate::types::{FeatureRecord, WearableDevice, WearableFeature, WearableSession};
use chrono::{DateTime, Utc};

/// Storage backend for the pipeline
pub trait WearableStore: Send + Sync {
    fn insert_session(&self, session: &WearableSession) -> Result<(), WearableError>;

    fn get_session(&self, session_id: &str) -> Result<Option<WearableSession>, WearableError>;

    /// Set `ended_at` (and `updated_at`); returns `None` if the session does not exist
    fn mark_session_ended(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<WearableSession>, WearableError>;

    fn touch_session(&self, session_id: &str, updated_at: DateTime<Utc>)
        -> Result<(), WearableError>;

    /// Append features for one session as a single unit
    fn append_features(
        &self,
        session_id: &str,
        features: &[WearableFeature],
    ) -> Result<(), WearableError>;

    /// All features of a session, ordered by window time then insertion
    fn list_features(&self, session_id: &str) -> Result<Vec<FeatureRecord>, WearableError>;

    /// The last `limit` features of a session, in ascending window order
    fn recent_features(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError>;

    /// The last `limit` features across every session of an athlete, ascending
    fn recent_athlete_features(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError>;

    /// Insert or refresh a registry entry; returns the stored entry
    fn upsert_device(&self, device: &WearableDevice) -> Result<WearableDevice, WearableError>;

    fn get_device(&self, device_id: &str) -> Result<Option<WearableDevice>, WearableError>;
}

/// Merge an incoming declaration over an existing registry entry.
///
/// Optional attributes the client did not send keep their stored value.
pub(crate) fn merge_device(existing: Option<&WearableDevice>, incoming: &WearableDevice) -> WearableDevice {
    match existing {
        Some(current) => WearableDevice {
            id: incoming.id.clone(),
            device_type: incoming.device_type.clone(),
            side: incoming.side.or(current.side),
            nickname: incoming.nickname.clone().or_else(|| current.nickname.clone()),
            athlete_id: incoming
                .athlete_id
                .clone()
                .or_else(|| current.athlete_id.clone()),
            last_seen_at: incoming.last_seen_at,
        },
        None => incoming.clone(),
    }
}

/// Keep the last `limit` entries of an ascending list
pub(crate) fn take_last<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if items.len() > limit {
        items.drain(..items.len() - limit);
    }
    items
}
