//! Core types for the Motion Flux pipeline
//!
//! This module defines the data structures that flow through the pipeline: raw
//! inertial samples and windows, the per-window feature record, and the capture
//! session and device registry records.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Schema version stamped on every persisted feature record
pub const FEATURE_SCHEMA_VERSION: &str = "wearable.feature.v1";

/// Which limb (or limb-mounted device) produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

/// One instant of motion data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch milliseconds
    pub ts: i64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl Sample {
    /// Acceleration vector magnitude
    pub fn magnitude(&self) -> f64 {
        (self.ax * self.ax + self.ay * self.ay + self.az * self.az).sqrt()
    }
}

/// One analysis interval of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleWindow {
    #[serde(default)]
    pub samples: Vec<Sample>,
    /// Explicit window center; accepts epoch milliseconds or RFC 3339 on input
    #[serde(
        default,
        deserialize_with = "deserialize_window_ts",
        skip_serializing_if = "Option::is_none"
    )]
    pub window_ts: Option<DateTime<Utc>>,
    /// Side applied to samples that carry no tag of their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl SampleWindow {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            window_ts: None,
            side: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn deserialize_window_ts<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Fractional(f64),
        Text(String),
    }

    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Millis(ms)) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("windowTs out of range: {ms}"))),
        Some(RawTimestamp::Fractional(ms)) => Utc
            .timestamp_millis_opt(ms.round() as i64)
            .single()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("windowTs out of range: {ms}"))),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| de::Error::custom(format!("invalid windowTs '{text}': {e}"))),
    }
}

/// Convert epoch milliseconds to a UTC timestamp (epoch for out-of-range input)
pub(crate) fn datetime_from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Window bookkeeping carried alongside the metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMeta {
    pub sample_count: usize,
    pub sample_interval_ms: f64,
    pub window_duration_ms: i64,
    pub side: Option<Side>,
}

/// Extractor output for one window.
///
/// Every metric is optional: a short or noisy window may not yield all of them, and a
/// missing metric is reported as `null`, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WearableFeature {
    pub window_ts: DateTime<Utc>,
    /// Time from window start to landing impact
    pub contact_ms: Option<i64>,
    /// Time from impact to settled landing
    pub stability_ms: Option<i64>,
    #[serde(rename = "valgusIdx0to3")]
    pub valgus_idx: Option<u8>,
    pub asymmetry_pct: Option<f64>,
    pub yaw_spike: Option<f64>,
    #[serde(rename = "confidence0to1")]
    pub confidence: Option<f64>,
    pub meta: FeatureMeta,
}

/// A feature as persisted and handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecord {
    pub schema_version: String,
    pub session_id: String,
    #[serde(flatten)]
    pub feature: WearableFeature,
}

impl FeatureRecord {
    pub fn new(session_id: &str, feature: WearableFeature) -> Self {
        Self {
            schema_version: FEATURE_SCHEMA_VERSION.to_string(),
            session_id: session_id.to_string(),
            feature,
        }
    }
}

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Flushed,
}

/// One capture of a drill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WearableSession {
    pub id: String,
    pub athlete_id: String,
    pub drill_type: String,
    pub device_ids: Vec<String>,
    pub surface: Option<String>,
    pub temp_f: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WearableSession {
    pub fn state(&self) -> SessionState {
        match self.ended_at {
            Some(_) => SessionState::Flushed,
            None => SessionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }
}

/// Request to open a capture session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub athlete_id: String,
    pub drill_type: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
    /// Devices to register before the session is created
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
    #[serde(default)]
    pub surface: Option<String>,
    #[serde(default)]
    pub temp_f: Option<f64>,
    #[serde(default)]
    pub humidity_pct: Option<f64>,
}

impl NewSession {
    pub fn new(athlete_id: impl Into<String>, drill_type: impl Into<String>) -> Self {
        Self {
            athlete_id: athlete_id.into(),
            drill_type: drill_type.into(),
            ..Default::default()
        }
    }
}

/// Device declaration as supplied by a capture client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub athlete_id: Option<String>,
}

/// Device registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WearableDevice {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub side: Option<Side>,
    pub nickname: Option<String>,
    pub athlete_id: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}
