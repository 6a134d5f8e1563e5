//! Wire framing for the Datadog TCP intake.
//!
//! Every record travels as one line: the API key, a space, the JSON object
//! produced by merging the static metadata with the record, and a CRLF
//! terminator. JSON string escaping guarantees the body never contains a raw
//! line break, so one record always maps to exactly one line.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::log_record::LogRecord;

use super::{config::DatadogConfig, error::TransportError};

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Merge static metadata with the record; record fields win on collision.
pub fn merge_metadata(metadata: &BTreeMap<String, String>, record: &LogRecord) -> Map<String, Value> {
    let mut merged: Map<String, Value> = metadata
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    merged.extend(
        record
            .fields()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

/// Produce the framed wire line for `record`.
///
/// Without an API key the line carries the JSON body alone.
pub fn encode_frame(config: &DatadogConfig, record: &LogRecord) -> Result<Vec<u8>, TransportError> {
    let merged = merge_metadata(&config.metadata, record);
    let mut frame = Vec::with_capacity(128);
    if let Some(api_key) = config.api_key.as_deref() {
        frame.extend_from_slice(api_key.as_bytes());
        frame.push(b' ');
    }
    serde_json::to_writer(&mut frame, &merged)?;
    frame.extend_from_slice(LINE_TERMINATOR);
    if frame.len() > config.max_record_bytes {
        return Err(TransportError::FrameTooLarge {
            size: frame.len(),
            limit: config.max_record_bytes,
        });
    }
    Ok(frame)
}
