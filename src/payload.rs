//! Sample payload normalization
//!
//! Capture clients send samples in several shapes. This module parses them at the
//! ingestion boundary into a tagged union and flattens each shape into a plain list
//! of windows for the extractor:
//! - an array of windows
//! - an object with a `windows` array
//! - an object holding a single window's `samples` (plus optional `windowTs`/`side`)
//! - newline-delimited window records
//!
//! Malformed stream lines and malformed array elements are skipped, never fatal.

use crate::error::WearableError;
use crate::types::SampleWindow;
use log::{debug, warn};
use serde_json::Value;

/// Incoming sample payload, one variant per accepted shape
#[derive(Debug, Clone)]
pub enum SamplePayload {
    /// `[{window}, {window}, ...]`
    Windows(Vec<Value>),
    /// `{"windows": [{window}, ...]}`
    Batch(Vec<Value>),
    /// `{"samples": [...], "windowTs": ..., "side": ...}`
    Single(SampleWindow),
    /// One window record per line
    Stream(String),
}

impl SamplePayload {
    /// Classify raw payload text.
    ///
    /// Text that is not a single JSON document is treated as a newline-delimited
    /// stream.
    pub fn parse(raw: &str) -> Result<Self, WearableError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(value),
            Err(_) => Ok(SamplePayload::Stream(raw.to_string())),
        }
    }

    /// Classify an already-decoded JSON payload
    pub fn from_value(value: Value) -> Result<Self, WearableError> {
        match value {
            Value::Array(items) => Ok(SamplePayload::Windows(items)),
            Value::Object(mut map) => {
                if let Some(windows) = map.remove("windows") {
                    return match windows {
                        Value::Array(items) => Ok(SamplePayload::Batch(items)),
                        other => Err(WearableError::InvalidPayload(format!(
                            "`windows` must be an array, got {}",
                            json_kind(&other)
                        ))),
                    };
                }
                if map.contains_key("samples") {
                    let window: SampleWindow = serde_json::from_value(Value::Object(map))?;
                    return Ok(SamplePayload::Single(window));
                }
                Err(WearableError::InvalidPayload(
                    "object has neither `windows` nor `samples`".to_string(),
                ))
            }
            Value::String(text) => Ok(SamplePayload::Stream(text)),
            other => Err(WearableError::InvalidPayload(format!(
                "expected array, object or stream, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Flatten into windows, in payload order
    pub fn into_windows(self) -> Vec<SampleWindow> {
        match self {
            SamplePayload::Windows(items) => normalize_array(items),
            SamplePayload::Batch(items) => normalize_array(items),
            SamplePayload::Single(window) => normalize_single(window),
            SamplePayload::Stream(text) => normalize_stream(&text),
        }
    }
}

fn normalize_array(items: Vec<Value>) -> Vec<SampleWindow> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<SampleWindow>(item) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("Skipping malformed window at index {idx}: {e}");
                None
            }
        })
        .collect()
}

fn normalize_single(window: SampleWindow) -> Vec<SampleWindow> {
    vec![window]
}

fn normalize_stream(text: &str) -> Vec<SampleWindow> {
    let mut windows = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<SampleWindow>(trimmed) {
            Ok(window) => windows.push(window),
            Err(e) => {
                warn!("Skipping unparseable line {}: {}", line_num + 1, e);
            }
        }
    }
    debug!("Parsed {} windows from stream", windows.len());
    windows
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    const WINDOW: &str = r#"{"samples": [{"ts": 0, "ax": 0, "ay": 1, "az": 9.8, "gx": 0, "gy": 0, "gz": 0}]}"#;

    #[test]
    fn test_array_of_windows() {
        let raw = format!("[{WINDOW}, {WINDOW}]");
        let payload = SamplePayload::parse(&raw).unwrap();

        assert!(matches!(payload, SamplePayload::Windows(_)));
        assert_eq!(payload.into_windows().len(), 2);
    }

    #[test]
    fn test_windows_object() {
        let raw = format!(r#"{{"windows": [{WINDOW}]}}"#);
        let payload = SamplePayload::parse(&raw).unwrap();

        assert!(matches!(payload, SamplePayload::Batch(_)));
        assert_eq!(payload.into_windows().len(), 1);
    }

    #[test]
    fn test_single_window_object() {
        let raw = r#"{"samples": [{"ts": 5, "ax": 0, "ay": 0, "az": 9.8, "gx": 0, "gy": 0, "gz": 0}], "side": "right", "windowTs": 1705312800000}"#;
        let windows = SamplePayload::parse(raw).unwrap().into_windows();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].side, Some(Side::Right));
        assert!(windows[0].window_ts.is_some());
    }

    #[test]
    fn test_stream_skips_bad_lines() {
        let raw = format!("{WINDOW}\n{{not json\n\n{WINDOW}\n");
        let payload = SamplePayload::parse(&raw).unwrap();

        assert!(matches!(payload, SamplePayload::Stream(_)));
        assert_eq!(payload.into_windows().len(), 2);
    }

    #[test]
    fn test_array_skips_malformed_elements() {
        let raw = format!(r#"[{WINDOW}, {{"samples": "nope"}}, 42]"#);
        assert_eq!(SamplePayload::parse(&raw).unwrap().into_windows().len(), 1);
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert!(matches!(
            SamplePayload::parse("42"),
            Err(WearableError::InvalidPayload(_))
        ));
        assert!(matches!(
            SamplePayload::parse(r#"{"frames": []}"#),
            Err(WearableError::InvalidPayload(_))
        ));
        assert!(matches!(
            SamplePayload::parse(r#"{"windows": 3}"#),
            Err(WearableError::InvalidPayload(_))
        ));
    }
}
