//! Sample ingestion
//!
//! Normalizes an incoming payload into windows, extracts one feature per window and
//! appends the results to the session. A batch is never all-or-nothing: windows
//! that yield no feature are skipped and only produced features are returned.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;

use crate::error::WearableError;
use crate::features::FeatureExtractor;
use crate::payload::SamplePayload;
use crate::store::WearableStore;
use crate::types::WearableFeature;

/// Result of one ingested batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// Features created by this batch only, in payload order
    pub features: Vec<WearableFeature>,
    pub windows_received: usize,
    pub windows_skipped: usize,
}

pub struct IngestionService {
    store: Arc<dyn WearableStore>,
    allow_after_flush: bool,
}

impl IngestionService {
    pub fn new(store: Arc<dyn WearableStore>, allow_after_flush: bool) -> Self {
        Self {
            store,
            allow_after_flush,
        }
    }

    /// Ingest raw payload text (JSON document or newline-delimited windows)
    pub fn ingest_raw(&self, session_id: &str, raw: &str) -> Result<IngestOutcome, WearableError> {
        self.check_session(session_id)?;
        let payload = SamplePayload::parse(raw)?;
        self.process(session_id, payload)
    }

    /// Ingest an already-classified payload
    pub fn ingest(
        &self,
        session_id: &str,
        payload: SamplePayload,
    ) -> Result<IngestOutcome, WearableError> {
        self.check_session(session_id)?;
        self.process(session_id, payload)
    }

    fn check_session(&self, session_id: &str) -> Result<(), WearableError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| WearableError::SessionNotFound(session_id.to_string()))?;

        if !session.is_open() && !self.allow_after_flush {
            return Err(WearableError::SessionClosed(session_id.to_string()));
        }
        Ok(())
    }

    fn process(
        &self,
        session_id: &str,
        payload: SamplePayload,
    ) -> Result<IngestOutcome, WearableError> {
        let windows = payload.into_windows();
        let features = FeatureExtractor::extract_all(&windows);

        let outcome = IngestOutcome {
            windows_received: windows.len(),
            windows_skipped: windows.len() - features.len(),
            features,
        };

        if !outcome.features.is_empty() {
            self.store.append_features(session_id, &outcome.features)?;
        }
        self.store.touch_session(session_id, Utc::now())?;

        if outcome.windows_skipped > 0 {
            debug!(
                "Session {session_id}: skipped {} empty windows",
                outcome.windows_skipped
            );
        }
        info!(
            "Session {session_id}: stored {} features from {} windows",
            outcome.features.len(),
            outcome.windows_received
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionController;
    use crate::store::MemoryStore;
    use crate::types::NewSession;

    const WINDOW: &str = r#"{"samples": [{"ts": 0, "ax": 0, "ay": 2, "az": 9.8, "gx": 0, "gy": 0, "gz": 0.1}, {"ts": 16, "ax": 0, "ay": 2, "az": 20, "gx": 0, "gy": 0, "gz": 0.3}]}"#;

    fn setup(allow_after_flush: bool) -> (IngestionService, SessionController, String) {
        let store: Arc<dyn WearableStore> = Arc::new(MemoryStore::new());
        let sessions = SessionController::new(store.clone());
        let session = sessions
            .create_session(&NewSession::new("athlete-1", "drop_jump"))
            .unwrap();
        (
            IngestionService::new(store, allow_after_flush),
            sessions,
            session.id,
        )
    }

    #[test]
    fn test_ingest_returns_only_new_features() {
        let (ingest, sessions, id) = setup(false);

        let first = ingest.ingest_raw(&id, &format!("[{WINDOW}]")).unwrap();
        let second = ingest
            .ingest_raw(&id, &format!("[{WINDOW}, {WINDOW}]"))
            .unwrap();

        assert_eq!(first.features.len(), 1);
        assert_eq!(second.features.len(), 2);
        assert_eq!(sessions.list_features(&id).unwrap().len(), 3);
        assert_eq!(first.features[0].contact_ms, Some(16));
    }

    #[test]
    fn test_empty_windows_are_skipped() {
        let (ingest, _, id) = setup(false);
        let outcome = ingest
            .ingest_raw(&id, &format!(r#"{{"windows": [{{"samples": []}}, {WINDOW}]}}"#))
            .unwrap();

        assert_eq!(outcome.windows_received, 2);
        assert_eq!(outcome.windows_skipped, 1);
        assert_eq!(outcome.features.len(), 1);
    }

    #[test]
    fn test_unknown_session_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let ingest = IngestionService::new(store.clone(), false);

        let result = ingest.ingest_raw("missing", &format!("[{WINDOW}]"));

        assert!(matches!(result, Err(WearableError::SessionNotFound(_))));
        assert!(store.list_features("missing").unwrap().is_empty());
    }

    #[test]
    fn test_flushed_session_rejects_batches() {
        let (ingest, sessions, id) = setup(false);
        sessions.flush(&id).unwrap();

        let result = ingest.ingest_raw(&id, WINDOW);
        assert!(matches!(result, Err(WearableError::SessionClosed(_))));
        assert!(sessions.list_features(&id).unwrap().is_empty());
    }

    #[test]
    fn test_flushed_session_accepts_batches_when_allowed() {
        let (ingest, sessions, id) = setup(true);
        sessions.flush(&id).unwrap();

        assert_eq!(ingest.ingest_raw(&id, WINDOW).unwrap().features.len(), 1);
    }

    #[test]
    fn test_ingest_refreshes_updated_at() {
        let (ingest, sessions, id) = setup(false);
        let before = sessions.get_session(&id).unwrap().updated_at;

        ingest.ingest_raw(&id, WINDOW).unwrap();

        assert!(sessions.get_session(&id).unwrap().updated_at >= before);
    }
}
