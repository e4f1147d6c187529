//! Feature extraction
//!
//! This module derives landing-mechanics features from one window of inertial samples:
//! - Ground contact (impact threshold crossing)
//! - Stabilization time after contact
//! - Valgus severity from lateral acceleration RMS
//! - Left/right lateral asymmetry
//! - Yaw spike and signal confidence
//!
//! Extraction is pure: the same window always yields the same feature.

use crate::types::{datetime_from_millis, FeatureMeta, Sample, SampleWindow, Side, WearableFeature};

/// Acceleration magnitude that marks a landing impact
pub const CONTACT_THRESHOLD: f64 = 18.0;

/// Mean magnitude under which a landing counts as settled
pub const STABLE_THRESHOLD: f64 = 5.0;

/// Number of consecutive samples averaged for the settle check
pub const STABLE_SPAN: usize = 6;

/// Lateral RMS upper bounds for valgus index 0, 1 and 2; anything above is 3
pub const VALGUS_BANDS: [f64; 3] = [6.0, 10.0, 14.0];

/// Sample count of a complete window
pub const NOMINAL_WINDOW_SAMPLES: usize = 128;

/// Sample interval assumed for single-sample windows
pub const DEFAULT_SAMPLE_INTERVAL_MS: f64 = 16.0;

/// Signal-to-noise ratio that maps to full confidence
pub const SNR_FULL_SCALE: f64 = 25.0;

/// Feature extractor for computing per-window features
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Extract features from one window. Returns `None` for an empty window.
    pub fn extract(window: &SampleWindow) -> Option<WearableFeature> {
        extract(window)
    }

    /// Extract features from a batch, dropping windows that yield nothing
    pub fn extract_all(windows: &[SampleWindow]) -> Vec<WearableFeature> {
        windows.iter().filter_map(extract).collect()
    }
}

/// Per-sample series derived from a time-ordered window
struct MotionSeries {
    magnitude: Vec<f64>,
    lateral: Vec<f64>,
    yaw: Vec<f64>,
    sides: Vec<Option<Side>>,
}

impl MotionSeries {
    fn from_samples(samples: &[&Sample], window_side: Option<Side>) -> Self {
        Self {
            magnitude: samples.iter().map(|s| s.magnitude()).collect(),
            lateral: samples.iter().map(|s| s.ay).collect(),
            yaw: samples.iter().map(|s| s.gz.abs()).collect(),
            sides: samples.iter().map(|s| s.side.or(window_side)).collect(),
        }
    }
}

/// Extract features from one window of samples
pub fn extract(window: &SampleWindow) -> Option<WearableFeature> {
    let mut samples: Vec<&Sample> = window.samples.iter().collect();
    samples.sort_by_key(|s| s.ts);

    let first_ts = samples.first()?.ts;
    let last_ts = samples.last()?.ts;
    let count = samples.len();

    let duration_ms = (last_ts - first_ts).max(1);
    let sample_interval = if count > 1 {
        duration_ms as f64 / (count - 1) as f64
    } else {
        DEFAULT_SAMPLE_INTERVAL_MS
    };

    let series = MotionSeries::from_samples(&samples, window.side);

    let contact_idx = detect_contact(&series.magnitude);
    let contact_ms = contact_idx.map(|idx| (idx as f64 * sample_interval).round() as i64);
    let stability_ms = contact_idx.and_then(|contact| {
        detect_stabilization(&series.magnitude, contact)
            .map(|settled| ((settled - contact) as f64 * sample_interval).round() as i64)
    });

    let window_ts = window
        .window_ts
        .unwrap_or_else(|| datetime_from_millis(samples[count / 2].ts));

    Some(WearableFeature {
        window_ts,
        contact_ms,
        stability_ms,
        valgus_idx: Some(valgus_index(rms(&series.lateral))),
        asymmetry_pct: compute_asymmetry(&series),
        yaw_spike: Some(round_to(series.yaw.iter().copied().fold(0.0, f64::max), 3)),
        confidence: Some(compute_confidence(&series)),
        meta: FeatureMeta {
            sample_count: count,
            sample_interval_ms: sample_interval,
            window_duration_ms: duration_ms,
            side: window.side,
        },
    })
}

/// Index of the first sample at or above the impact threshold
fn detect_contact(magnitude: &[f64]) -> Option<usize> {
    magnitude.iter().position(|&m| m >= CONTACT_THRESHOLD)
}

/// First position at or after contact whose next `STABLE_SPAN` samples average
/// under the settle threshold. Positions without a full span left are not checked.
fn detect_stabilization(magnitude: &[f64], contact: usize) -> Option<usize> {
    magnitude
        .windows(STABLE_SPAN)
        .enumerate()
        .skip(contact)
        .find(|(_, span)| mean(span) < STABLE_THRESHOLD)
        .map(|(position, _)| position)
}

/// Map lateral RMS onto the 0-3 valgus ordinal
fn valgus_index(lateral_rms: f64) -> u8 {
    VALGUS_BANDS
        .iter()
        .position(|&upper| lateral_rms < upper)
        .unwrap_or(VALGUS_BANDS.len()) as u8
}

/// Relative lateral RMS difference between left- and right-tagged samples
fn compute_asymmetry(series: &MotionSeries) -> Option<f64> {
    let side_rms = |side: Side| -> Option<f64> {
        let values: Vec<f64> = series
            .lateral
            .iter()
            .zip(&series.sides)
            .filter(|(_, s)| **s == Some(side))
            .map(|(v, _)| *v)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(rms(&values))
        }
    };

    match (side_rms(Side::Left), side_rms(Side::Right)) {
        (Some(left), Some(right)) if left > 0.0 && right > 0.0 => {
            Some(round_to((left - right).abs() / left.max(right) * 100.0, 1))
        }
        _ => None,
    }
}

/// Confidence from signal-to-noise ratio scaled by window completeness
fn compute_confidence(series: &MotionSeries) -> f64 {
    let signal_energy: f64 = series.magnitude.iter().map(|m| m * m).sum();
    let noise_energy: f64 = series.lateral.iter().map(|v| v * v).sum::<f64>()
        + series.yaw.iter().map(|v| v * v).sum::<f64>();
    let noise_energy = noise_energy.max(1.0);

    let snr = if signal_energy > 0.0 {
        signal_energy / noise_energy
    } else {
        0.0
    };
    let completeness = (series.magnitude.len() as f64 / NOMINAL_WINDOW_SAMPLES as f64).min(1.0);

    round_to(((snr / SNR_FULL_SCALE) * completeness).clamp(0.0, 1.0), 3)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
