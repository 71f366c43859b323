//! Record codecs.
//!
//! A codec turns the raw bytes of one array element into a record and back,
//! and knows how to find a record's identifier and soft-delete it. The typed
//! [`UserCodec`] enforces the user schema; [`RawCodec`] keeps each element as
//! an untyped JSON object and only looks at `id`, `deleted` and
//! `metadata.deleted_at`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::buffer::{write_json, Layout};
use crate::user::User;
use idpjson_common::{Error, Result};

/// Untyped record: one JSON object.
pub type RawRecord = Map<String, Value>;

/// Translation between array elements and records.
pub trait RecordCodec {
    type Record;

    /// Codec name, for logs.
    fn name(&self) -> &'static str;

    /// Decode one element.
    ///
    /// # Errors
    /// - `Decode` if the bytes are not valid JSON or do not fit the schema
    fn decode(&self, raw: &[u8]) -> Result<Self::Record>;

    /// Encode one record, appending to `out`.
    fn encode(&self, record: &Self::Record, layout: Layout, out: &mut Vec<u8>) -> Result<()>;

    /// Identifier used to match deletes, if the record has one.
    fn identifier<'a>(&self, record: &'a Self::Record) -> Option<&'a str>;

    /// Mark the record deleted at `at`.
    fn mark_deleted(&self, record: &mut Self::Record, at: DateTime<Utc>);
}

/// Codec for the typed user schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserCodec;

impl RecordCodec for UserCodec {
    type Record = User;

    fn name(&self) -> &'static str {
        "user"
    }

    fn decode(&self, raw: &[u8]) -> Result<User> {
        serde_json::from_slice(raw).map_err(|e| Error::Decode(e.to_string()))
    }

    fn encode(&self, record: &User, layout: Layout, out: &mut Vec<u8>) -> Result<()> {
        write_json(record, layout, out)
    }

    fn identifier<'a>(&self, record: &'a User) -> Option<&'a str> {
        Some(record.id.as_str())
    }

    fn mark_deleted(&self, record: &mut User, at: DateTime<Utc>) {
        record.mark_deleted(at);
    }
}

/// Codec that keeps records as untyped JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RecordCodec for RawCodec {
    type Record = RawRecord;

    fn name(&self) -> &'static str {
        "raw"
    }

    fn decode(&self, raw: &[u8]) -> Result<RawRecord> {
        match serde_json::from_slice(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::Decode(format!(
                "expected a JSON object, found {}",
                kind_of(&other)
            ))),
            Err(e) => Err(Error::Decode(e.to_string())),
        }
    }

    fn encode(&self, record: &RawRecord, layout: Layout, out: &mut Vec<u8>) -> Result<()> {
        write_json(record, layout, out)
    }

    fn identifier<'a>(&self, record: &'a RawRecord) -> Option<&'a str> {
        record.get("id").and_then(Value::as_str)
    }

    fn mark_deleted(&self, record: &mut RawRecord, at: DateTime<Utc>) {
        record.insert("deleted".to_string(), Value::Bool(true));

        let stamp = Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        let metadata = record
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        match metadata {
            Value::Object(fields) => {
                fields.insert("deleted_at".to_string(), stamp);
            }
            // A non-object metadata member cannot carry the timestamp.
            other => {
                let mut fields = Map::new();
                fields.insert("deleted_at".to_string(), stamp);
                *other = Value::Object(fields);
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
