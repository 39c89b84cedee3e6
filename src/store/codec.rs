//! Conversions between JSON values and stored column values.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::seq::SliceRandom;
use rusqlite::types::Value;
use serde_json::{Number, Value as Json};

use crate::sql::DbResult;

/// zlib level used for document bodies.
pub const BODY_COMPRESSION_LEVEL: u32 = 7;

/// JSON → column value. Arrays and objects are stored as JSON text.
///
/// Booleans become 0/1 so index columns compare like numbers; use
/// [`to_exact_column`] when the value must read back unchanged.
pub fn to_column(value: &Json) -> DbResult<Value> {
    Ok(match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Integer(i64::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(_) | Json::Object(_) => Value::Text(serde_json::to_string(value)?),
    })
}

/// Like [`to_column`], but booleans and integers above `i64::MAX` are
/// stored as JSON in a BLOB so [`from_column`] gives them back as they were.
pub fn to_exact_column(value: &Json) -> DbResult<Value> {
    match value {
        Json::Bool(_) => Ok(Value::Blob(serde_json::to_vec(value)?)),
        Json::Number(n) if n.as_i64().is_none() && n.is_u64() => {
            Ok(Value::Blob(serde_json::to_vec(value)?))
        }
        _ => to_column(value),
    }
}

/// Column value → JSON scalar. JSON text is returned as a string, not decoded.
pub fn from_column(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(i) => Json::from(i),
        Value::Real(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s),
        Value::Blob(b) => match serde_json::from_slice::<Json>(&b) {
            Ok(exact @ (Json::Bool(_) | Json::Number(_))) => exact,
            _ => Json::String(String::from_utf8_lossy(&b).into_owned()),
        },
    }
}

/// Interpret a stored scalar as a number. Unparseable values count as 0.
pub fn as_number(value: &Json) -> f64 {
    match value {
        Json::Number(n) => n.as_f64().unwrap_or(0.0),
        Json::String(s) => s.trim().parse().unwrap_or(0.0),
        Json::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Number → JSON, keeping integral results integral.
pub fn from_number(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Json::from(n as i64)
    } else {
        Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

/// Decode a stored scalar as a JSON array; anything else yields an empty list.
pub fn as_list(value: Option<&Json>) -> Vec<Json> {
    match value {
        Some(Json::String(s)) => match serde_json::from_str::<Json>(s) {
            Ok(Json::Array(items)) => items,
            Ok(Json::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            Ok(Json::Null) | Err(_) => Vec::new(),
            Ok(other) => vec![other],
        },
        Some(Json::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

/// JSON-encode then zlib-compress a document body.
pub fn encode_body(body: &Json) -> DbResult<Vec<u8>> {
    let json = serde_json::to_vec(body)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(BODY_COMPRESSION_LEVEL));
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Reverse of [`encode_body`].
pub fn decode_body(bytes: &[u8]) -> DbResult<Json> {
    let mut json = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Seconds since the epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// A short content id from the clock and a random UUID, shuffled and cut
/// to `length` characters. Collisions are unlikely, not impossible.
pub fn generate_id(length: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seed = format!("{nanos:x}{}", uuid::Uuid::new_v4().simple());
    let mut chars: Vec<char> = seed.chars().collect();
    chars.shuffle(&mut rand::thread_rng());
    chars.into_iter().take(length).collect()
}
