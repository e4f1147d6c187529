//! Session lifecycle
//!
//! Sessions are created open, receive any number of sample batches, and become
//! flushed once `ended_at` is set. Flushing again just refreshes the timestamp.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::error::WearableError;
use crate::store::WearableStore;
use crate::types::{
    DeviceDescriptor, FeatureRecord, NewSession, WearableDevice, WearableSession,
};

pub struct SessionController {
    store: Arc<dyn WearableStore>,
}

impl SessionController {
    pub fn new(store: Arc<dyn WearableStore>) -> Self {
        Self { store }
    }

    /// Open a new session. Only the session record is written; declared device
    /// descriptors are registered separately through [`Self::upsert_devices`].
    pub fn create_session(&self, request: &NewSession) -> Result<WearableSession, WearableError> {
        let now = Utc::now();
        let session = WearableSession {
            id: Uuid::new_v4().to_string(),
            athlete_id: request.athlete_id.clone(),
            drill_type: request.drill_type.clone(),
            device_ids: request.device_ids.clone(),
            surface: request.surface.clone(),
            temp_f: request.temp_f,
            humidity_pct: request.humidity_pct,
            started_at: now,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_session(&session)?;
        info!(
            "Created session {} (athlete {}, drill {})",
            session.id, session.athlete_id, session.drill_type
        );
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<WearableSession, WearableError> {
        self.store
            .get_session(session_id)?
            .ok_or_else(|| WearableError::SessionNotFound(session_id.to_string()))
    }

    /// Mark a session ended
    pub fn flush(&self, session_id: &str) -> Result<WearableSession, WearableError> {
        let session = self
            .store
            .mark_session_ended(session_id, Utc::now())?
            .ok_or_else(|| WearableError::SessionNotFound(session_id.to_string()))?;
        info!("Flushed session {session_id}");
        Ok(session)
    }

    /// Every stored feature of a session in window order; unknown sessions have none
    pub fn list_features(&self, session_id: &str) -> Result<Vec<FeatureRecord>, WearableError> {
        self.store.list_features(session_id)
    }

    pub fn recent_features(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        self.store.recent_features(session_id, limit)
    }

    pub fn recent_athlete_features(
        &self,
        athlete_id: &str,
        limit: usize,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        self.store.recent_athlete_features(athlete_id, limit)
    }

    /// Register or refresh devices. Best effort: a descriptor that cannot be stored
    /// is logged and left out of the result.
    pub fn upsert_devices(&self, descriptors: &[DeviceDescriptor]) -> Vec<WearableDevice> {
        let seen_at = Utc::now();
        descriptors
            .iter()
            .filter_map(|descriptor| {
                let device = WearableDevice {
                    id: descriptor
                        .id
                        .clone()
                        .filter(|id| !id.trim().is_empty())
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                    device_type: descriptor.device_type.clone(),
                    side: descriptor.side,
                    nickname: descriptor.nickname.clone(),
                    athlete_id: descriptor.athlete_id.clone(),
                    last_seen_at: seen_at,
                };
                match self.store.upsert_device(&device) {
                    Ok(stored) => Some(stored),
                    Err(e) => {
                        warn!("Failed to upsert device {}: {}", device.id, e);
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Side;

    fn controller() -> SessionController {
        SessionController::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_create_and_flush() {
        let controller = controller();
        let session = controller
            .create_session(&NewSession::new("athlete-1", "drop_jump"))
            .unwrap();
        assert!(session.is_open());

        let flushed = controller.flush(&session.id).unwrap();
        assert!(flushed.ended_at.is_some());

        let again = controller.flush(&session.id).unwrap();
        assert!(again.ended_at >= flushed.ended_at);
    }

    #[test]
    fn test_same_athlete_may_hold_concurrent_sessions() {
        let controller = controller();
        let request = NewSession::new("athlete-1", "cut");
        let first = controller.create_session(&request).unwrap();
        let second = controller.create_session(&request).unwrap();

        assert_ne!(first.id, second.id);
        assert!(controller.get_session(&first.id).unwrap().is_open());
    }

    #[test]
    fn test_flush_unknown_session() {
        assert!(matches!(
            controller().flush("nope"),
            Err(WearableError::SessionNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_upsert_devices_generates_missing_ids() {
        let controller = controller();
        let devices = controller.upsert_devices(&[
            DeviceDescriptor {
                id: Some("imu-l".to_string()),
                device_type: "shank_imu".to_string(),
                side: Some(Side::Left),
                ..Default::default()
            },
            DeviceDescriptor {
                device_type: "shank_imu".to_string(),
                side: Some(Side::Right),
                ..Default::default()
            },
        ]);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "imu-l");
        assert!(!devices[1].id.is_empty());

        let again = controller.upsert_devices(&[DeviceDescriptor {
            id: Some("imu-l".to_string()),
            device_type: "shank_imu".to_string(),
            ..Default::default()
        }]);
        assert_eq!(again[0].side, Some(Side::Left));
    }
}
