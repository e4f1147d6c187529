//! Pipeline orchestration
//!
//! This module provides the public API for Motion Flux. `WearablePipeline` fronts the
//! session controller and the ingestion service and applies the process-wide gate:
//! when the pipeline is disabled every operation fails fast before touching storage.

use std::sync::Arc;

use log::debug;

use crate::config::PipelineConfig;
use crate::error::WearableError;
use crate::features::FeatureExtractor;
use crate::ingest::{IngestOutcome, IngestionService};
use crate::payload::SamplePayload;
use crate::session::SessionController;
use crate::store::{MemoryStore, SqliteStore, WearableStore};
use crate::types::{
    DeviceDescriptor, FeatureRecord, NewSession, WearableDevice, WearableFeature, WearableSession,
};

/// Extract features from a raw sample payload without any session or storage.
///
/// # Example
/// ```ignore
/// let features = extract_features(r#"{"samples": [...]}"#)?;
/// ```
pub fn extract_features(raw: &str) -> Result<Vec<WearableFeature>, WearableError> {
    let windows = SamplePayload::parse(raw)?.into_windows();
    Ok(FeatureExtractor::extract_all(&windows))
}

/// Session-aware pipeline over a shared store.
///
/// Cheap to share behind an `Arc`; calls for different sessions need no coordination.
pub struct WearablePipeline {
    config: PipelineConfig,
    sessions: SessionController,
    ingestion: IngestionService,
}

impl WearablePipeline {
    /// Create a pipeline over an existing store
    pub fn new(config: PipelineConfig, store: Arc<dyn WearableStore>) -> Self {
        Self {
            sessions: SessionController::new(store.clone()),
            ingestion: IngestionService::new(store, config.allow_ingest_after_flush),
            config,
        }
    }

    /// Create a pipeline with the store named by the configuration: the SQLite file at
    /// `database_path`, or an in-memory store when none is set
    pub fn open(config: PipelineConfig) -> Result<Self, WearableError> {
        let store: Arc<dyn WearableStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn ensure_enabled(&self, operation: &str) -> Result<(), WearableError> {
        if self.config.enabled {
            Ok(())
        } else {
            debug!("Rejected {operation}: pipeline disabled");
            Err(WearableError::FeatureDisabled)
        }
    }

    /// Register declared devices, then open a session that references them
    pub fn start_session(&self, request: NewSession) -> Result<WearableSession, WearableError> {
        self.ensure_enabled("start_session")?;

        let mut request = request;
        let devices = self.sessions.upsert_devices(&request.devices);
        for device in devices {
            if !request.device_ids.contains(&device.id) {
                request.device_ids.push(device.id);
            }
        }
        self.sessions.create_session(&request)
    }

    /// Register or refresh devices. Never fails; disabled pipelines register nothing.
    pub fn upsert_devices(&self, descriptors: &[DeviceDescriptor]) -> Vec<WearableDevice> {
        if self.ensure_enabled("upsert_devices").is_err() {
            return Vec::new();
        }
        self.sessions.upsert_devices(descriptors)
    }

    pub fn get_session(&self, session_id: &str) -> Result<WearableSession, WearableError> {
        self.ensure_enabled("get_session")?;
        self.sessions.get_session(session_id)
    }

    /// Append a batch of sample windows given as raw text
    pub fn ingest_raw(&self, session_id: &str, raw: &str) -> Result<IngestOutcome, WearableError> {
        self.ensure_enabled("ingest")?;
        self.ingestion.ingest_raw(session_id, raw)
    }

    /// Append an already-classified batch of sample windows
    pub fn ingest(
        &self,
        session_id: &str,
        payload: SamplePayload,
    ) -> Result<IngestOutcome, WearableError> {
        self.ensure_enabled("ingest")?;
        self.ingestion.ingest(session_id, payload)
    }

    pub fn flush(&self, session_id: &str) -> Result<WearableSession, WearableError> {
        self.ensure_enabled("flush")?;
        self.sessions.flush(session_id)
    }

    pub fn list_features(&self, session_id: &str) -> Result<Vec<FeatureRecord>, WearableError> {
        self.ensure_enabled("list_features")?;
        self.sessions.list_features(session_id)
    }

    /// The most recent windows of a session, oldest first. `None` uses the
    /// configured window count.
    pub fn recent_features(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        self.ensure_enabled("recent_features")?;
        self.sessions
            .recent_features(session_id, limit.unwrap_or(self.config.recent_window_count))
    }

    /// The most recent windows across all sessions of an athlete, oldest first
    pub fn recent_athlete_features(
        &self,
        athlete_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<FeatureRecord>, WearableError> {
        self.ensure_enabled("recent_athlete_features")?;
        self.sessions
            .recent_athlete_features(athlete_id, limit.unwrap_or(self.config.recent_window_count))
    }
}
