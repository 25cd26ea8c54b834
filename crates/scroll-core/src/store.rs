//! The `HistoryStore` and `ThreadDirectory` traits and supporting types.
//!
//! The traits are implemented by storage backends (e.g.
//! `scroll-store-sqlite`). The gate and the CLI depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  info::InfoMessageType,
  record::{Mutation, NewRecord, Record, RecordType, SortId},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`HistoryStore::list_thread`].
#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery {
  pub thread_id: Uuid,
  /// Only records ordered strictly after this position.
  pub after:     Option<SortId>,
  pub limit:     Option<usize>,
}

impl HistoryQuery {
  pub fn thread(thread_id: Uuid) -> Self {
    Self { thread_id, after: None, limit: None }
  }
}

// ─── Thread bookkeeping ──────────────────────────────────────────────────────

/// Which records take part in a thread's unread count and last-message
/// preview.
///
/// Info records are treated like any other record unless their type is
/// listed in `excluded_info_types`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPolicy {
  #[serde(default)]
  pub excluded_info_types: Vec<InfoMessageType>,
}

impl ThreadPolicy {
  pub fn includes(
    &self,
    record_type: RecordType,
    info_type: Option<InfoMessageType>,
  ) -> bool {
    match (record_type, info_type) {
      (RecordType::Info, Some(ty)) => !self.excluded_info_types.contains(&ty),
      _ => true,
    }
  }

  pub fn includes_record(&self, record: &Record) -> bool {
    self.includes(
      record.record_type(),
      record.info().map(|info| info.message_type()),
    )
  }
}

/// Computed read model for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
  pub thread_id:        Uuid,
  /// Highest position ever assigned in the thread, including deleted rows.
  pub last_sort_id:     SortId,
  pub unread_count:     u64,
  /// Most recent record eligible for the last-message preview.
  pub last_record_id:   Option<Uuid>,
  pub last_activity_at: Option<DateTime<Utc>>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Abstraction over a conversation-history backend.
///
/// `create` must assign `sort_id` through the thread's ordering authority
/// and notify the thread of the new record in the same serialised step.
/// `load` must reconcile stale rows through [`crate::stored::StoredRecord::load`].
/// `update` must apply the mutation as one atomic read-modify-write.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Validate and persist a new record with a freshly generated id.
  fn create(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Persist a record with a caller-supplied id; used by import and
  /// migration. Returns an error if the id is already taken.
  fn create_with_id(
    &self,
    id: Uuid,
    input: NewRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Apply one of the sanctioned mutations and return the updated record.
  fn update(
    &self,
    id: Uuid,
    mutation: Mutation,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Delete a single record.
  fn delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete every record in a thread and return how many were removed. The
  /// thread's ordering state survives so positions are never reused.
  fn delete_thread(
    &self,
    thread_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete every record whose expiration deadline is at or before `now`,
  /// returning their ids.
  fn delete_expired(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve a record by id. Returns `None` if not found.
  fn load(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// A thread's records in ascending `sort_id` order.
  fn list_thread(
    &self,
    query: HistoryQuery,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;
}

/// The thread collaborator: ordering authority and bookkeeping sink.
pub trait ThreadDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Highest position assigned so far; `SortId(0)` for an unknown thread.
  fn current_max_sort_id(
    &self,
    thread_id: Uuid,
  ) -> impl Future<Output = Result<SortId, Self::Error>> + Send + '_;

  /// Reserve the next position. Serialised per thread.
  fn next_sort_id(
    &self,
    thread_id: Uuid,
  ) -> impl Future<Output = Result<SortId, Self::Error>> + Send + '_;

  /// Bookkeeping hook for a record that entered the thread.
  fn record_added<'a>(
    &'a self,
    record: &'a Record,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Materialise the thread's read model. Returns `None` for a thread that
  /// never had a record.
  fn summary(
    &self,
    thread_id: Uuid,
  ) -> impl Future<Output = Result<Option<ThreadSummary>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_policy_includes_everything() {
    let policy = ThreadPolicy::default();
    assert!(policy.includes(RecordType::Incoming, None));
    assert!(policy.includes(
      RecordType::Info,
      Some(InfoMessageType::UnknownProtocolVersion)
    ));
  }

  #[test]
  fn excluded_info_types_only_affect_info_records() {
    let policy = ThreadPolicy {
      excluded_info_types: vec![InfoMessageType::UnknownProtocolVersion],
    };
    assert!(!policy.includes(
      RecordType::Info,
      Some(InfoMessageType::UnknownProtocolVersion)
    ));
    assert!(policy.includes(RecordType::Info, Some(InfoMessageType::GroupQuit)));
    assert!(policy.includes(RecordType::Outgoing, None));
  }

  #[test]
  fn policy_deserialises_snake_case_types() {
    let policy: ThreadPolicy = serde_json::from_str(
      r#"{"excluded_info_types": ["unknown_protocol_version"]}"#,
    )
    .unwrap();
    assert_eq!(
      policy.excluded_info_types,
      [InfoMessageType::UnknownProtocolVersion]
    );
  }
}
