//! The logical persisted form of a [`Record`].
//!
//! Backends keep identity, ordering and the schema stamps in their own
//! columns and the rest of the record as a JSON field set. Loading goes
//! through [`StoredRecord::load`], which applies the backfill tables in
//! [`crate::migrate`] before decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  info::{InfoEvent, InfoEventKind, InfoMessageType},
  migrate::{DefaultApplied, Fields, SchemaScope, backfill},
  record::{
    Expiration, IncomingMessage, MessageContent, Record, RecordKind, RecordType,
    SortId,
  },
  Error, Result,
};

// ─── Field layout ────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct StoredFields {
  timestamp:   DateTime<Utc>,
  received_at: DateTime<Utc>,
  expiration:  Expiration,
  #[serde(flatten)]
  content:     MessageContent,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  incoming:    Option<IncomingMessage>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  info:        Option<StoredInfo>,
}

/// [`InfoEvent`] minus its schema stamp, which lives beside the row.
#[derive(Serialize, Deserialize)]
struct StoredInfo {
  #[serde(flatten)]
  event:          InfoEventKind,
  custom_message: Option<String>,
  read:           bool,
  read_at:        Option<DateTime<Utc>>,
  silent:         bool,
}

// ─── StoredRecord ────────────────────────────────────────────────────────────

/// A record as a backend persists it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
  pub unique_id:           Uuid,
  pub thread_id:           Uuid,
  pub sort_id:             SortId,
  pub record_type:         RecordType,
  /// Denormalised tag of info records, for backends that filter on it.
  pub info_type:           Option<InfoMessageType>,
  pub schema_version:      u32,
  /// `None` on non-info rows. On info rows, `None` means the row predates
  /// payload versioning and is treated as version 0.
  pub info_schema_version: Option<u32>,
  pub fields:              Fields,
}

/// The result of loading a stored row.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
  pub record:           Record,
  /// Every default the backfill step filled in, in table order.
  pub defaults_applied: Vec<DefaultApplied>,
}

impl StoredRecord {
  pub fn from_record(record: &Record) -> Result<Self> {
    let (incoming, info) = match &record.kind {
      RecordKind::Incoming(m) => (Some(m.clone()), None),
      RecordKind::Outgoing => (None, None),
      RecordKind::Info(info) => (None, Some(StoredInfo {
        event:          info.event.clone(),
        custom_message: info.custom_message.clone(),
        read:           info.read,
        read_at:        info.read_at,
        silent:         info.silent,
      })),
    };

    let stored = StoredFields {
      timestamp: record.timestamp,
      received_at: record.received_at,
      expiration: record.expiration,
      content: record.content.clone(),
      incoming,
      info,
    };

    let Value::Object(fields) = serde_json::to_value(&stored)? else {
      return Err(Error::MalformedFields("record"));
    };

    Ok(Self {
      unique_id: record.unique_id,
      thread_id: record.thread_id,
      sort_id: record.sort_id,
      record_type: record.record_type(),
      info_type: record.info().map(InfoEvent::message_type),
      schema_version: record.schema_version,
      info_schema_version: record.info().map(|info| info.schema_version),
      fields,
    })
  }

  /// Reconcile the row with the running code's layout and decode it.
  ///
  /// A row that decodes but breaks the construction rules, or whose
  /// `info_type` disagrees with its payload, is corrupt and never becomes a
  /// record.
  ///
  /// The record keeps the schema stamps it was stored with; they only move
  /// forward when the record is next written.
  pub fn load(self) -> Result<LoadedRecord> {
    let mut fields = self.fields;
    let mut defaults_applied =
      backfill(&mut fields, SchemaScope::Record, self.schema_version)?;

    let info_version = match self.record_type {
      RecordType::Info => {
        let version = self.info_schema_version.unwrap_or(0);
        let info = fields
          .get_mut("info")
          .and_then(Value::as_object_mut)
          .ok_or(Error::MissingField("info"))?;
        defaults_applied.extend(backfill(info, SchemaScope::InfoEvent, version)?);
        version
      }
      RecordType::Incoming | RecordType::Outgoing => 0,
    };

    let stored: StoredFields = serde_json::from_value(Value::Object(fields))?;

    let kind = match self.record_type {
      RecordType::Incoming => RecordKind::Incoming(
        stored.incoming.ok_or(Error::MissingField("incoming"))?,
      ),
      RecordType::Outgoing => RecordKind::Outgoing,
      RecordType::Info => {
        let info = stored.info.ok_or(Error::MissingField("info"))?;
        RecordKind::Info(InfoEvent {
          event:          info.event,
          custom_message: info.custom_message,
          read:           info.read,
          read_at:        info.read_at,
          silent:         info.silent,
          schema_version: info_version,
        })
      }
    };

    let record = Record {
      unique_id: self.unique_id,
      thread_id: self.thread_id,
      sort_id: self.sort_id,
      schema_version: self.schema_version,
      timestamp: stored.timestamp,
      received_at: stored.received_at,
      expiration: stored.expiration,
      content: stored.content,
      kind,
    };

    let payload_type = record.info().map(InfoEvent::message_type);
    if self.info_type != payload_type {
      return Err(Error::InfoTypeMismatch {
        column:  self.info_type,
        payload: payload_type,
      });
    }
    record.validate().map_err(|e| Error::CorruptRecord(Box::new(e)))?;

    Ok(LoadedRecord { record, defaults_applied })
  }
}
