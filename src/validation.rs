//! Input validation module
//!
//! Settings validation, lenient numeric coercion for upstream payloads and
//! query parameter checks for the published surface.

use serde_json::Value;
use tracing::{debug, warn};
use validator::{Validate, ValidationErrors};

use crate::config::{Settings, SettingsError};
use crate::error::{AppError, AppResult};

/// Validate all settings sections
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    let mut messages = Vec::new();

    if let Err(errors) = settings.upstream.validate() {
        messages.extend(collect_messages(&errors));
    }
    if let Err(errors) = settings.monitor.validate() {
        messages.extend(collect_messages(&errors));
    }

    if !messages.is_empty() {
        warn!(errors = ?messages, "Settings validation failed");
        return Err(SettingsError::Invalid(messages.join("; ")));
    }

    debug!("Settings validation passed");
    Ok(())
}

fn collect_messages(errors: &ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let msgs: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.message.as_ref().map(|c| c.as_ref()))
                .collect();
            format!("{}: {}", field, msgs.join(", "))
        })
        .collect()
}

/// Interpret a JSON value as a finite number.
///
/// Numbers and numeric strings are accepted; everything else, including
/// `null`, booleans and non-finite values, yields `None`.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

/// Validate the `limit` query parameter of the history endpoint
pub fn validate_history_limit(limit: Option<usize>, capacity: usize) -> AppResult<usize> {
    match limit {
        None => Ok(capacity),
        Some(0) => Err(AppError::ValidationError(
            "limit must be greater than 0".to_string(),
        )),
        Some(limit) if limit > capacity => Err(AppError::ValidationError(format!(
            "limit must not exceed {}",
            capacity
        ))),
        Some(limit) => Ok(limit),
    }
}
