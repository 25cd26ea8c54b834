//! [`SqliteStore`], the SQLite implementation of [`HistoryStore`] and
//! [`ThreadDirectory`].

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use scroll_core::{
  info::InfoMessageType,
  record::{Mutation, NewRecord, Record, RecordType, SortId},
  store::{HistoryQuery, HistoryStore, ThreadDirectory, ThreadPolicy, ThreadSummary},
};

use crate::{
  encode::{
    decode_millis, decode_sort_id, decode_uuid, encode_millis, encode_sort_id,
    encode_uuid, EncodedRecord, RawRecord,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A scroll history store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  policy: Arc<ThreadPolicy>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, policy: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, policy: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the thread bookkeeping policy.
  pub fn with_policy(mut self, policy: ThreadPolicy) -> Self {
    self.policy = Arc::new(policy);
    self
  }

  pub fn policy(&self) -> &ThreadPolicy { &self.policy }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Validate, assign a position, insert and notify the thread, in one
  /// transaction on the connection thread.
  async fn insert(&self, unique_id: Uuid, input: NewRecord) -> Result<Record> {
    // The real sort id is filled in once the thread hands one out.
    let mut record = input.into_record(unique_id, SortId::default())?;
    let row = EncodedRecord::encode(&record)?;
    let activity_ms = self
      .policy
      .includes_record(&record)
      .then(|| encode_millis(record.received_at));

    let sort_id: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken = tx
          .query_row(
            "SELECT 1 FROM records WHERE unique_id = ?1",
            rusqlite::params![row.unique_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(None);
        }

        let sort_id = bump_sort_id(&tx, &row.thread_id)?;
        tx.execute(
          "INSERT INTO records (
             unique_id, thread_id, sort_id, record_type, info_type,
             is_unread, expires_at_ms, schema_version, info_schema_version,
             fields_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            row.unique_id,
            row.thread_id,
            sort_id,
            row.record_type,
            row.info_type,
            row.is_unread,
            row.expires_at_ms,
            row.schema_version,
            row.info_schema_version,
            row.fields_json,
          ],
        )?;
        if let Some(ms) = activity_ms {
          touch_thread(&tx, &row.thread_id, ms)?;
        }

        tx.commit()?;
        Ok(Some(sort_id))
      })
      .await?;

    let Some(sort_id) = sort_id else {
      return Err(Error::DuplicateId(unique_id));
    };
    record.sort_id = decode_sort_id(sort_id)?;

    tracing::debug!(
      record = %record.unique_id,
      thread = %record.thread_id,
      sort_id = %record.sort_id,
      record_type = %record.record_type(),
      "record created"
    );
    Ok(record)
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL, e.g. to plant rows written by older code.
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Connection-thread helpers ───────────────────────────────────────────────

/// Reserve the next position in a thread, creating its counter on first use.
fn bump_sort_id(conn: &rusqlite::Connection, thread_id: &str) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT INTO threads (thread_id, last_sort_id) VALUES (?1, 0)
     ON CONFLICT(thread_id) DO NOTHING",
    rusqlite::params![thread_id],
  )?;
  conn.query_row(
    "UPDATE threads SET last_sort_id = last_sort_id + 1
     WHERE thread_id = ?1
     RETURNING last_sort_id",
    rusqlite::params![thread_id],
    |r| r.get(0),
  )
}

/// Move the thread's activity marker forward; never backwards.
fn touch_thread(
  conn: &rusqlite::Connection,
  thread_id: &str,
  activity_ms: i64,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO threads (thread_id, last_sort_id, last_activity_ms) VALUES (?1, 0, ?2)
     ON CONFLICT(thread_id) DO UPDATE SET
       last_activity_ms = MAX(COALESCE(last_activity_ms, 0), excluded.last_activity_ms)",
    rusqlite::params![thread_id, activity_ms],
  )?;
  Ok(())
}

fn select_record(
  conn: &rusqlite::Connection,
  unique_id: &str,
) -> rusqlite::Result<Option<RawRecord>> {
  conn
    .query_row(
      &format!("SELECT {} FROM records WHERE unique_id = ?1", RawRecord::COLUMNS),
      rusqlite::params![unique_id],
      RawRecord::from_row,
    )
    .optional()
}

/// Read-modify-write of one record inside a single transaction.
fn mutate_in_tx(
  conn: &mut rusqlite::Connection,
  id: Uuid,
  mutation: Mutation,
) -> Result<Record> {
  let tx = conn.transaction()?;
  let raw = select_record(&tx, &encode_uuid(id))?.ok_or(Error::RecordNotFound(id))?;
  let mut record = raw.load()?;

  if !record.apply(&mutation)? {
    return Ok(record);
  }
  record.restamp();
  record.validate()?;

  let row = EncodedRecord::encode(&record)?;
  tx.execute(
    "UPDATE records SET
       is_unread = ?2, expires_at_ms = ?3, schema_version = ?4,
       info_schema_version = ?5, fields_json = ?6
     WHERE unique_id = ?1",
    rusqlite::params![
      row.unique_id,
      row.is_unread,
      row.expires_at_ms,
      row.schema_version,
      row.info_schema_version,
      row.fields_json,
    ],
  )?;
  tx.commit()?;

  tracing::debug!(record = %id, mutation = mutation.name(), "record updated");
  Ok(record)
}

fn classify(
  record_type: &str,
  info_type: Option<&str>,
) -> Result<(RecordType, Option<InfoMessageType>)> {
  let record_type = record_type
    .parse::<RecordType>()
    .map_err(|_| scroll_core::Error::UnknownRecordType(record_type.to_owned()))?;
  let info_type = info_type
    .map(|s| {
      s.parse::<InfoMessageType>()
        .map_err(|_| Error::InvalidColumn(format!("unknown info type: {s:?}")))
    })
    .transpose()?;
  Ok((record_type, info_type))
}

fn summary_in_tx(
  conn: &mut rusqlite::Connection,
  thread_id: Uuid,
  policy: &ThreadPolicy,
) -> Result<Option<ThreadSummary>> {
  let tx = conn.transaction()?;
  let id_str = encode_uuid(thread_id);

  let Some((last_sort_id, last_activity_ms)) = tx
    .query_row(
      "SELECT last_sort_id, last_activity_ms FROM threads WHERE thread_id = ?1",
      rusqlite::params![id_str],
      |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?)),
    )
    .optional()?
  else {
    return Ok(None);
  };

  let mut unread_count = 0;
  {
    let mut stmt = tx.prepare(
      "SELECT record_type, info_type FROM records
       WHERE thread_id = ?1 AND is_unread = 1",
    )?;
    let mut rows = stmt.query(rusqlite::params![id_str])?;
    while let Some(row) = rows.next()? {
      let record_type: String = row.get(0)?;
      let info_type: Option<String> = row.get(1)?;
      let (rt, it) = classify(&record_type, info_type.as_deref())?;
      if policy.includes(rt, it) {
        unread_count += 1;
      }
    }
  }

  let mut last_record_id = None;
  {
    let mut stmt = tx.prepare(
      "SELECT unique_id, record_type, info_type FROM records
       WHERE thread_id = ?1
       ORDER BY sort_id DESC",
    )?;
    let mut rows = stmt.query(rusqlite::params![id_str])?;
    while let Some(row) = rows.next()? {
      let unique_id: String = row.get(0)?;
      let record_type: String = row.get(1)?;
      let info_type: Option<String> = row.get(2)?;
      let (rt, it) = classify(&record_type, info_type.as_deref())?;
      if policy.includes(rt, it) {
        last_record_id = Some(decode_uuid(&unique_id)?);
        break;
      }
    }
  }

  Ok(Some(ThreadSummary {
    thread_id,
    last_sort_id: decode_sort_id(last_sort_id)?,
    unread_count,
    last_record_id,
    last_activity_at: last_activity_ms.map(decode_millis).transpose()?,
  }))
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create(&self, input: NewRecord) -> Result<Record> {
    self.insert(Uuid::new_v4(), input).await
  }

  async fn create_with_id(&self, id: Uuid, input: NewRecord) -> Result<Record> {
    self.insert(id, input).await
  }

  async fn update(&self, id: Uuid, mutation: Mutation) -> Result<Record> {
    self
      .conn
      .call(move |conn| Ok(mutate_in_tx(conn, id, mutation)))
      .await?
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM records WHERE unique_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if affected == 0 {
      return Err(Error::RecordNotFound(id));
    }
    tracing::debug!(record = %id, "record deleted");
    Ok(())
  }

  async fn delete_thread(&self, thread_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(thread_id);
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM records WHERE thread_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    tracing::info!(thread = %thread_id, deleted = affected, "thread history deleted");
    Ok(affected as u64)
  }

  async fn delete_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let now_ms = encode_millis(now);
    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ids = {
          let mut stmt = tx.prepare(
            "SELECT unique_id FROM records
             WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
          )?;
          stmt
            .query_map(rusqlite::params![now_ms], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
        };
        tx.execute(
          "DELETE FROM records
           WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
          rusqlite::params![now_ms],
        )?;
        tx.commit()?;
        Ok(ids)
      })
      .await?;

    if !ids.is_empty() {
      tracing::info!(count = ids.len(), "expired records deleted");
    }
    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn load(&self, id: Uuid) -> Result<Option<Record>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| Ok(select_record(conn, &id_str)?))
      .await?;

    raw.map(RawRecord::load).transpose()
  }

  async fn list_thread(&self, query: HistoryQuery) -> Result<Vec<Record>> {
    let thread_str = encode_uuid(query.thread_id);
    let after = query.after.map(encode_sort_id).transpose()?.unwrap_or(0);
    let limit = query
      .limit
      .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM records
           WHERE thread_id = ?1 AND sort_id > ?2
           ORDER BY sort_id ASC
           LIMIT ?3",
          RawRecord::COLUMNS
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![thread_str, after, limit],
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::load).collect()
  }
}

// ─── ThreadDirectory impl ────────────────────────────────────────────────────

impl ThreadDirectory for SqliteStore {
  type Error = Error;

  async fn current_max_sort_id(&self, thread_id: Uuid) -> Result<SortId> {
    let id_str = encode_uuid(thread_id);
    let last: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT last_sort_id FROM threads WHERE thread_id = ?1",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    decode_sort_id(last.unwrap_or(0))
  }

  async fn next_sort_id(&self, thread_id: Uuid) -> Result<SortId> {
    let id_str = encode_uuid(thread_id);
    let next = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let next = bump_sort_id(&tx, &id_str)?;
        tx.commit()?;
        Ok(next)
      })
      .await?;

    decode_sort_id(next)
  }

  async fn record_added<'a>(&'a self, record: &'a Record) -> Result<()> {
    if !self.policy.includes_record(record) {
      return Ok(());
    }
    let id_str = encode_uuid(record.thread_id);
    let activity_ms = encode_millis(record.received_at);
    self
      .conn
      .call(move |conn| Ok(touch_thread(conn, &id_str, activity_ms)?))
      .await?;
    Ok(())
  }

  async fn summary(&self, thread_id: Uuid) -> Result<Option<ThreadSummary>> {
    let policy = Arc::clone(&self.policy);
    self
      .conn
      .call(move |conn| Ok(summary_in_tx(conn, thread_id, &policy)))
      .await?
  }
}
