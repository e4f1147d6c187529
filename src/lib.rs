//! Motion Flux - Wearable IMU ingestion and landing-mechanics feature extraction
//!
//! Flux turns raw inertial samples from body-worn devices into per-window
//! biomechanical features through a deterministic pipeline: payload normalization →
//! windowing → feature extraction → append-only feature store.
//!
//! ## Modules
//!
//! - **Feature Extractor**: pure per-window computation of contact, stabilization,
//!   valgus, asymmetry, yaw and confidence
//! - **Sessions and Ingestion**: capture sessions, device registry and batched
//!   ingestion into a persisted feature store

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod payload;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use error::WearableError;
pub use features::{extract, FeatureExtractor};
pub use ingest::IngestOutcome;
pub use payload::SamplePayload;
pub use pipeline::{extract_features, WearablePipeline};
pub use store::{MemoryStore, SqliteStore, WearableStore};
pub use types::{
    DeviceDescriptor, FeatureRecord, NewSession, Sample, SampleWindow, Side, WearableDevice,
    WearableFeature, WearableSession, FEATURE_SCHEMA_VERSION,
};

/// Flux version embedded in CLI reports
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for CLI reports
pub const PRODUCER_NAME: &str = "motion-flux";
