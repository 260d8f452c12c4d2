//! Shape validation for stored check records.
//!
//! Stored records are untyped JSON written by the surrounding CRUD layer, so
//! every field is checked individually and the whole record is rejected on
//! the first failure. A rejected record is skipped for one sweep only; it is
//! validated again on the next one.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{CheckSpec, CheckState, HttpMethod, Protocol};

pub const CHECK_ID_LENGTH: usize = 20;
pub const MIN_TIMEOUT_SECONDS: u8 = 1;
pub const MAX_TIMEOUT_SECONDS: u8 = 5;

/// Why a stored record was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("field `{field}` is missing")]
    Missing { field: &'static str },
    #[error("field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Rejected {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Rejected::Invalid { field, reason: reason.into() }
    }
}

/// Validate a raw stored record into a [`CheckSpec`].
///
/// `state` and `lastChecked` are optional: a record that was never evaluated
/// comes back as `down` with no `last_checked`.
pub fn validate_check(raw: &Value) -> Result<CheckSpec, Rejected> {
    let record = raw.as_object().ok_or(Rejected::NotAnObject)?;

    Ok(CheckSpec {
        id: validate_id(record)?,
        owner_id: validate_owner(record)?,
        protocol: validate_protocol(record)?,
        url: validate_url(record)?,
        method: validate_method(record)?,
        success_codes: validate_success_codes(record)?,
        timeout_seconds: validate_timeout(record)?,
        state: normalize_state(record),
        last_checked: normalize_last_checked(record),
    })
}

/// Serialize a spec back into its stored record form
pub fn to_record(spec: &CheckSpec) -> Result<Value, serde_json::Error> {
    serde_json::to_value(spec)
}

fn required<'a>(record: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, Rejected> {
    match record.get(field) {
        None | Some(Value::Null) => Err(Rejected::Missing { field }),
        Some(value) => Ok(value),
    }
}

fn required_str<'a>(record: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, Rejected> {
    required(record, field)?
        .as_str()
        .ok_or_else(|| Rejected::invalid(field, "expected a string"))
}

fn validate_id(record: &Map<String, Value>) -> Result<String, Rejected> {
    let id = required_str(record, "id")?.trim();

    if id.chars().count() != CHECK_ID_LENGTH {
        return Err(Rejected::invalid(
            "id",
            format!("expected {CHECK_ID_LENGTH} characters, got {}", id.chars().count()),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Rejected::invalid("id", "must be alphanumeric"));
    }

    Ok(id.to_string())
}

/// Owner key; records written before the rename carry it as `userPhone`
fn validate_owner(record: &Map<String, Value>) -> Result<String, Rejected> {
    let field = if record.contains_key("ownerId") { "ownerId" } else { "userPhone" };
    let owner = required_str(record, field)
        .map_err(|error| match error {
            Rejected::Missing { .. } => Rejected::Missing { field: "ownerId" },
            other => other,
        })?
        .trim();

    if owner.is_empty() {
        return Err(Rejected::invalid(field, "must not be empty"));
    }

    Ok(owner.to_string())
}

fn validate_protocol(record: &Map<String, Value>) -> Result<Protocol, Rejected> {
    match required_str(record, "protocol")? {
        "http" => Ok(Protocol::Http),
        "https" => Ok(Protocol::Https),
        other => Err(Rejected::invalid("protocol", format!("unsupported protocol `{other}`"))),
    }
}

fn validate_url(record: &Map<String, Value>) -> Result<String, Rejected> {
    let url = required_str(record, "url")?.trim();
    if url.is_empty() {
        return Err(Rejected::invalid("url", "must not be empty"));
    }
    Ok(url.to_string())
}

fn validate_method(record: &Map<String, Value>) -> Result<HttpMethod, Rejected> {
    match required_str(record, "method")? {
        "get" => Ok(HttpMethod::Get),
        "post" => Ok(HttpMethod::Post),
        "put" => Ok(HttpMethod::Put),
        "delete" => Ok(HttpMethod::Delete),
        other => Err(Rejected::invalid("method", format!("unsupported method `{other}`"))),
    }
}

fn validate_success_codes(record: &Map<String, Value>) -> Result<BTreeSet<u16>, Rejected> {
    let codes = required(record, "successCodes")?
        .as_array()
        .ok_or_else(|| Rejected::invalid("successCodes", "expected an array"))?;

    if codes.is_empty() {
        return Err(Rejected::invalid("successCodes", "must not be empty"));
    }

    codes
        .iter()
        .map(|code| {
            code.as_u64()
                .filter(|code| (100..=599).contains(code))
                .map(|code| code as u16)
                .ok_or_else(|| Rejected::invalid("successCodes", format!("`{code}` is not an HTTP status")))
        })
        .collect()
}

fn validate_timeout(record: &Map<String, Value>) -> Result<u8, Rejected> {
    let value = required(record, "timeoutSeconds")?;
    let seconds = value
        .as_f64()
        .filter(|seconds| seconds.fract() == 0.0)
        .ok_or_else(|| Rejected::invalid("timeoutSeconds", "expected a whole number"))?;

    if seconds < f64::from(MIN_TIMEOUT_SECONDS) || seconds > f64::from(MAX_TIMEOUT_SECONDS) {
        return Err(Rejected::invalid(
            "timeoutSeconds",
            format!("{seconds} is outside {MIN_TIMEOUT_SECONDS}..={MAX_TIMEOUT_SECONDS}"),
        ));
    }

    Ok(seconds as u8)
}

fn normalize_state(record: &Map<String, Value>) -> CheckState {
    match record.get("state").and_then(Value::as_str) {
        Some("up") => CheckState::Up,
        _ => CheckState::Down,
    }
}

fn normalize_last_checked(record: &Map<String, Value>) -> Option<DateTime<Utc>> {
    record
        .get("lastChecked")
        .and_then(Value::as_f64)
        .filter(|millis| *millis > 0.0)
        .and_then(|millis| DateTime::from_timestamp_millis(millis as i64))
}
