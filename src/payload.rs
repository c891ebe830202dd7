//! Payload decoding
//!
//! Turns Telemetry Source responses and push-stream frames into [`Reading`]s.
//!
//! A payload that is not a JSON object is structurally invalid and fails the
//! cycle. Everything else is checked per field: display fields (temperature,
//! humidity, air quality) that are absent or non-numeric are coerced to `0`,
//! and a missing or unparseable `timestamp` leaves the reading undated. Strict
//! mode turns either case into an [`MonitorError::InvalidField`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{MonitorError, MonitorResult};
use crate::health::synthesize_smoothed;
use crate::models::Reading;
use crate::validation::coerce_number;

const TEMPERATURE: &[&str] = &["temperature"];
const HUMIDITY: &[&str] = &["humidity"];
const AIR_QUALITY: &[&str] = &["air_quality", "gas", "pm25", "pm2_5"];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Decode one `/iot/latest` response body
pub fn decode_reading(
    payload: &Value,
    received_at: DateTime<Utc>,
    strict: bool,
) -> MonitorResult<Reading> {
    let object = payload.as_object().ok_or_else(|| {
        MonitorError::MalformedPayload(format!("expected a JSON object, got {}", type_name(payload)))
    })?;

    let timestamp = timestamp_field(object.get("timestamp"), strict)?;
    let temperature = display_field(object, TEMPERATURE, strict)?;
    let humidity = display_field(object, HUMIDITY, strict)?;
    let air_quality = display_field(object, AIR_QUALITY, strict)?;
    let kalman_temp = synthesize_smoothed(coerce_number(object.get("kalman_temp")), temperature);

    Ok(Reading::new(
        temperature.unwrap_or(0.0),
        humidity.unwrap_or(0.0),
        air_quality.unwrap_or(0.0),
        received_at,
        received_at,
    )
    .with_timestamp(timestamp)
    .with_kalman_temp(kalman_temp))
}

/// Decode one push-stream text frame.
///
/// Frames are either flat readings or the backend broadcast shape
/// `{timestamp, raw: {...}, filtered: {...}}`, in which case the raw values are
/// the reading and `filtered.temperature` is the smoothed estimate.
pub fn decode_push_frame(
    frame: &str,
    received_at: DateTime<Utc>,
    strict: bool,
) -> MonitorResult<Reading> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| MonitorError::MalformedPayload(format!("push frame is not JSON: {}", e)))?;

    let Some(raw) = value.get("raw").and_then(Value::as_object) else {
        return decode_reading(&value, received_at, strict);
    };

    let mut flat = raw.clone();
    if let Some(timestamp) = value.get("timestamp") {
        flat.insert("timestamp".to_string(), timestamp.clone());
    }
    if let Some(filtered) = value.get("filtered").and_then(|f| f.get("temperature")) {
        flat.insert("kalman_temp".to_string(), filtered.clone());
    }

    decode_reading(&Value::Object(flat), received_at, strict)
}

/// First numeric value among `names`; `None` when absent or non-numeric
fn display_field(
    object: &Map<String, Value>,
    names: &[&str],
    strict: bool,
) -> MonitorResult<Option<f64>> {
    let field = names[0];
    let raw = names.iter().find_map(|name| object.get(*name));

    match coerce_number(raw) {
        Some(number) => Ok(Some(number)),
        None if strict => Err(MonitorError::InvalidField {
            field: field.to_string(),
            reason: describe(raw),
        }),
        None => {
            warn!(field = field, value = %describe(raw), "Coercing non-numeric field to 0");
            Ok(None)
        }
    }
}

/// Source timestamp; `None` (lenient) when absent or unparseable
fn timestamp_field(value: Option<&Value>, strict: bool) -> MonitorResult<Option<DateTime<Utc>>> {
    match parse_timestamp(value) {
        Some(timestamp) => Ok(Some(timestamp)),
        None if strict => Err(MonitorError::InvalidField {
            field: "timestamp".to_string(),
            reason: describe(value),
        }),
        None => {
            warn!(value = %describe(value), "Reading has no usable timestamp");
            Ok(None)
        }
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp_str(s.trim()),
        // Epoch milliseconds
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Offset-less timestamps are UTC
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "missing".to_string(),
        Some(v) => format!("{} {}", type_name(v), v),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
