//! Row parsing and column encoding helpers.
//!
//! Every repo converts `libsql::Row` (column-indexed) into typed structs.
//! These helpers isolate the parsing logic and the encodings shared between
//! reads and writes: timestamps, JSON columns, and embedding blobs.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use strata_core::entities::Metadata;

use crate::error::DatabaseError;

/// The current time at storage precision.
///
/// Structs built from this value compare equal to the rows read back.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage.
///
/// Microsecond precision with a `Z` suffix, so lexical order matches
/// chronological order.
#[must_use]
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00Z"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse an optional TEXT column as `Option<DateTime<Utc>>`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string cannot be parsed.
pub fn parse_optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(parse_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with the strata-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Parse a TEXT column holding any JSON value.
///
/// # Errors
///
/// Returns `DatabaseError::Query` on invalid JSON.
pub fn parse_json(s: &str) -> Result<serde_json::Value, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))
}

/// Parse a TEXT column holding a JSON object. Empty strings read as `{}`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` on invalid JSON or a non-object value.
pub fn parse_object(s: &str) -> Result<Metadata, DatabaseError> {
    if s.is_empty() {
        return Ok(Metadata::new());
    }
    match parse_json(s)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(DatabaseError::Query(format!(
            "Expected JSON object in column, found {other}"
        ))),
    }
}

/// Parse a TEXT column holding a JSON array of strings.
///
/// # Errors
///
/// Returns `DatabaseError::Query` on invalid JSON.
pub fn parse_string_list(s: &str) -> Result<Vec<String>, DatabaseError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(s)
        .map_err(|e| DatabaseError::Query(format!("Invalid string list in column: {e}")))
}

/// Serialize a value for a JSON TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Other` if serialization fails.
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Other(e.into()))
}

/// Encode an embedding as little-endian `f32` bytes.
#[must_use]
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode an embedding BLOB written by [`embedding_to_blob`].
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` if the length is not a multiple of 4.
pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>, DatabaseError> {
    if blob.len() % 4 != 0 {
        return Err(DatabaseError::InvalidState(format!(
            "embedding blob of {} bytes is not a whole number of f32s",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Read a nullable BLOB column as an embedding.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read or decode fails.
pub fn get_opt_embedding(row: &libsql::Row, idx: i32) -> Result<Option<Vec<f32>>, DatabaseError> {
    match row.get::<Option<Vec<u8>>>(idx)? {
        Some(blob) if !blob.is_empty() => Ok(Some(blob_to_embedding(&blob)?)),
        _ => Ok(None),
    }
}

/// Read a COUNT column as `u64`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_count(row: &libsql::Row, idx: i32) -> Result<u64, DatabaseError> {
    let n = row.get::<i64>(idx)?;
    u64::try_from(n).map_err(|_| DatabaseError::InvalidState(format!("negative count {n}")))
}
