//! Schema migration discipline.
//!
//! Two independent layout counters are stamped on every stored row: the
//! record-wide [`RECORD_SCHEMA_VERSION`] and, for info records only, the
//! narrower [`INFO_EVENT_SCHEMA_VERSION`]. A row written by older code is
//! *stale*; on load, every field introduced after the row's version is
//! filled from the default its table entry declares. Backfill is pure and
//! never written back by a load, so loading the same row twice yields the
//! same record.
//!
//! A row stamped *newer* than the running code is not something older
//! clients produce; it is reported as corrupt rather than guessed at.
//! Version skew with remote peers is a separate concern handled by
//! [`crate::gate`].

use serde_json::{Map, Value, json};
use strum::Display;

use crate::{Error, Result};

/// Record layout version written by this code.
pub const RECORD_SCHEMA_VERSION: u32 = 3;

/// Info-event payload layout version written by this code.
pub const INFO_EVENT_SCHEMA_VERSION: u32 = 3;

/// A stored field set, keyed by field name.
pub type Fields = Map<String, Value>;

// ─── Backfill tables ─────────────────────────────────────────────────────────

/// A field that did not exist before `introduced_in`, and the value rows
/// older than that receive.
#[derive(Debug, Clone, Copy)]
pub struct FieldBackfill {
  pub field:         &'static str,
  pub introduced_in: u32,
  /// Computes the default from the (already partially backfilled) row.
  pub default:       fn(&Fields) -> Value,
}

/// Ordered by `introduced_in` so a default may read fields backfilled by
/// earlier entries.
pub const RECORD_BACKFILLS: &[FieldBackfill] = &[
  FieldBackfill {
    field:         "received_at",
    introduced_in: 2,
    default:       received_at_default,
  },
  FieldBackfill {
    field:         "expiration",
    introduced_in: 2,
    default:       expiration_default,
  },
  FieldBackfill {
    field:         "view_once",
    introduced_in: 3,
    default:       view_once_default,
  },
  FieldBackfill { field: "link_preview", introduced_in: 3, default: null_default },
  FieldBackfill { field: "sticker", introduced_in: 3, default: null_default },
];

pub const INFO_EVENT_BACKFILLS: &[FieldBackfill] = &[
  // Info rows from before payload versioning predate unread tracking.
  FieldBackfill { field: "read", introduced_in: 1, default: true_default },
  FieldBackfill { field: "read_at", introduced_in: 2, default: null_default },
  FieldBackfill { field: "silent", introduced_in: 3, default: false_default },
];

fn received_at_default(fields: &Fields) -> Value {
  fields.get("timestamp").cloned().unwrap_or(Value::Null)
}

fn expiration_default(_: &Fields) -> Value {
  json!({ "expires_in_seconds": 0, "expire_started_at": null, "expires_at": null })
}

fn view_once_default(_: &Fields) -> Value {
  json!({ "is_view_once": false, "is_complete": false })
}

fn null_default(_: &Fields) -> Value { Value::Null }

fn true_default(_: &Fields) -> Value { Value::Bool(true) }

fn false_default(_: &Fields) -> Value { Value::Bool(false) }

// ─── Schema state ────────────────────────────────────────────────────────────

/// Which layout counter a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SchemaScope {
  Record,
  InfoEvent,
}

impl SchemaScope {
  pub fn current_version(self) -> u32 {
    match self {
      Self::Record => RECORD_SCHEMA_VERSION,
      Self::InfoEvent => INFO_EVENT_SCHEMA_VERSION,
    }
  }

  pub fn backfills(self) -> &'static [FieldBackfill] {
    match self {
      Self::Record => RECORD_BACKFILLS,
      Self::InfoEvent => INFO_EVENT_BACKFILLS,
    }
  }
}

/// Where a loaded row stands relative to the running code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
  Current,
  Stale { stored: u32 },
}

impl SchemaState {
  pub fn classify(scope: SchemaScope, stored: u32) -> Result<Self> {
    let current = scope.current_version();
    match stored.cmp(&current) {
      std::cmp::Ordering::Equal => Ok(Self::Current),
      std::cmp::Ordering::Less => Ok(Self::Stale { stored }),
      std::cmp::Ordering::Greater => {
        Err(Error::SchemaFromFuture { scope, stored, current })
      }
    }
  }
}

// ─── Backfill ────────────────────────────────────────────────────────────────

/// Observable record of one default being filled in. Not an error: useful
/// for spotting rows that keep needing migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultApplied {
  pub scope:          SchemaScope,
  pub field:          &'static str,
  pub introduced_in:  u32,
  pub stored_version: u32,
}

/// Fill every field introduced after `stored_version` that the row lacks.
///
/// Fields already present are left untouched, whatever their version.
pub fn backfill(
  fields: &mut Fields,
  scope: SchemaScope,
  stored_version: u32,
) -> Result<Vec<DefaultApplied>> {
  let SchemaState::Stale { stored } = SchemaState::classify(scope, stored_version)?
  else {
    return Ok(Vec::new());
  };

  let mut applied = Vec::new();
  for entry in scope.backfills() {
    if entry.introduced_in <= stored || fields.contains_key(entry.field) {
      continue;
    }
    let value = (entry.default)(fields);
    fields.insert(entry.field.to_owned(), value);
    applied.push(DefaultApplied {
      scope,
      field: entry.field,
      introduced_in: entry.introduced_in,
      stored_version: stored,
    });
  }
  Ok(applied)
}
