//! Encoding and decoding helpers between scroll domain types and the column
//! representations stored in SQLite.
//!
//! UUIDs are stored as hyphenated lowercase strings and index-only
//! timestamps as unix milliseconds. Everything the record layout versions
//! govern lives in `fields_json` and goes through
//! [`StoredRecord`](scroll_core::stored::StoredRecord).

use chrono::{DateTime, Utc};
use scroll_core::{
  info::InfoMessageType,
  record::{Record, RecordType, SortId},
  stored::StoredRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Millis ───────────────────────────────────────────────────────────────────

pub fn encode_millis(dt: DateTime<Utc>) -> i64 { dt.timestamp_millis() }

pub fn decode_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::InvalidColumn(format!("timestamp out of range: {ms}")))
}

// ─── Integers ─────────────────────────────────────────────────────────────────

pub fn encode_sort_id(id: SortId) -> Result<i64> {
  i64::try_from(id.get())
    .map_err(|_| Error::InvalidColumn(format!("sort id out of range: {id}")))
}

pub fn decode_sort_id(v: i64) -> Result<SortId> {
  u64::try_from(v)
    .map(SortId)
    .map_err(|_| Error::InvalidColumn(format!("negative sort id: {v}")))
}

fn decode_version(column: &str, v: i64) -> Result<u32> {
  u32::try_from(v)
    .map_err(|_| Error::InvalidColumn(format!("{column} out of range: {v}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `records` row.
pub struct RawRecord {
  pub unique_id:           String,
  pub thread_id:           String,
  pub sort_id:             i64,
  pub record_type:         String,
  pub info_type:           Option<String>,
  pub schema_version:      i64,
  pub info_schema_version: Option<i64>,
  pub fields_json:         String,
}

impl RawRecord {
  /// Column list matching [`RawRecord::from_row`].
  pub const COLUMNS: &'static str = "unique_id, thread_id, sort_id, record_type, \
                                     info_type, schema_version, \
                                     info_schema_version, fields_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      unique_id:           row.get(0)?,
      thread_id:           row.get(1)?,
      sort_id:             row.get(2)?,
      record_type:         row.get(3)?,
      info_type:           row.get(4)?,
      schema_version:      row.get(5)?,
      info_schema_version: row.get(6)?,
      fields_json:         row.get(7)?,
    })
  }

  pub fn into_stored(self) -> Result<StoredRecord> {
    let record_type: RecordType = self.record_type.parse().map_err(|_| {
      scroll_core::Error::UnknownRecordType(self.record_type.clone())
    })?;

    let info_type = self
      .info_type
      .as_deref()
      .map(|s| {
        s.parse::<InfoMessageType>()
          .map_err(|_| Error::InvalidColumn(format!("unknown info type: {s:?}")))
      })
      .transpose()?;

    let fields = match serde_json::from_str(&self.fields_json)? {
      serde_json::Value::Object(map) => map,
      _ => return Err(scroll_core::Error::MalformedFields("fields_json").into()),
    };

    Ok(StoredRecord {
      unique_id: decode_uuid(&self.unique_id)?,
      thread_id: decode_uuid(&self.thread_id)?,
      sort_id: decode_sort_id(self.sort_id)?,
      record_type,
      info_type,
      schema_version: decode_version("schema_version", self.schema_version)?,
      info_schema_version: self
        .info_schema_version
        .map(|v| decode_version("info_schema_version", v))
        .transpose()?,
      fields,
    })
  }

  /// Decode and reconcile the row with the running code's layout. Every
  /// default the backfill fills in is logged.
  pub fn load(self) -> Result<Record> {
    let loaded = self.into_stored()?.load()?;
    for applied in &loaded.defaults_applied {
      tracing::debug!(
        record = %loaded.record.unique_id,
        scope = %applied.scope,
        field = applied.field,
        introduced_in = applied.introduced_in,
        stored_version = applied.stored_version,
        "migration default applied"
      );
    }
    Ok(loaded.record)
  }
}

/// Column values ready to be bound into an INSERT or UPDATE.
pub struct EncodedRecord {
  pub unique_id:           String,
  pub thread_id:           String,
  pub sort_id:             i64,
  pub record_type:         &'static str,
  pub info_type:           Option<String>,
  pub is_unread:           bool,
  pub expires_at_ms:       Option<i64>,
  pub schema_version:      i64,
  pub info_schema_version: Option<i64>,
  pub fields_json:         String,
}

impl EncodedRecord {
  pub fn encode(record: &Record) -> Result<Self> {
    let stored = StoredRecord::from_record(record)?;
    Ok(Self {
      unique_id:           encode_uuid(stored.unique_id),
      thread_id:           encode_uuid(stored.thread_id),
      sort_id:             encode_sort_id(stored.sort_id)?,
      record_type:         stored.record_type.into(),
      info_type:           stored.info_type.map(|t| t.to_string()),
      is_unread:           record.is_unread(),
      expires_at_ms:       record.expiration.expires_at.map(encode_millis),
      schema_version:      i64::from(stored.schema_version),
      info_schema_version: stored.info_schema_version.map(i64::from),
      fields_json:         serde_json::Value::Object(stored.fields).to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn millis_round_trip() {
    let dt = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
    assert_eq!(decode_millis(encode_millis(dt)).unwrap(), dt);
  }

  #[test]
  fn negative_sort_id_is_rejected() {
    assert!(matches!(decode_sort_id(-1), Err(Error::InvalidColumn(_))));
    assert_eq!(decode_sort_id(5).unwrap(), SortId(5));
  }

  #[test]
  fn unknown_record_type_is_reported() {
    let raw = RawRecord {
      unique_id:           encode_uuid(Uuid::nil()),
      thread_id:           encode_uuid(Uuid::nil()),
      sort_id:             1,
      record_type:         "carrier_pigeon".into(),
      info_type:           None,
      schema_version:      1,
      info_schema_version: None,
      fields_json:         "{}".into(),
    };
    assert!(matches!(
      raw.into_stored(),
      Err(Error::Core(scroll_core::Error::UnknownRecordType(_)))
    ));
  }
}
