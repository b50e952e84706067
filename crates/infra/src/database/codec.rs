//! Column encodings shared by the SQLite repositories

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("timestamp out of range: {micros}")))
}

pub(crate) fn parse_uuid(idx: usize, text: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(text).map_err(|err| conversion_error(idx, Type::Text, err.to_string()))
}

/// Parse a status column written through `Display`.
pub(crate) fn parse_text<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(text).map_err(|err| conversion_error(idx, Type::Text, err))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

pub(crate) fn from_json<T: DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|err| conversion_error(idx, Type::Text, err.to_string()))
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}
