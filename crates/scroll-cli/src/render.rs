//! Terminal output for records and thread summaries.

use scroll_core::{
  capability::Capabilities,
  record::Record,
  store::ThreadSummary,
};
use serde::Serialize;

/// One history line: position, arrival time, type and summary text.
pub fn record_line(record: &Record, capabilities: &Capabilities) -> String {
  let marker = if record.is_unread() { '*' } else { ' ' };
  let tag = match record.info() {
    Some(info) => info.message_type().to_string(),
    None => record.record_type().to_string(),
  };
  let unknown = record
    .unknown_protocol()
    .filter(|u| u.is_protocol_version_unknown(capabilities))
    .map_or("", |_| " [unsupported]");

  format!(
    "{marker}{:>6}  {}  {tag}{unknown}  {}",
    record.sort_id.get(),
    record.received_at.format("%Y-%m-%d %H:%M:%S"),
    record.summary(capabilities),
  )
}

pub fn summary_lines(summary: &ThreadSummary) -> Vec<String> {
  vec![
    format!("thread:        {}", summary.thread_id),
    format!("last sort id:  {}", summary.last_sort_id),
    format!("unread:        {}", summary.unread_count),
    format!(
      "last record:   {}",
      summary
        .last_record_id
        .map_or_else(|| "-".to_owned(), |id| id.to_string())
    ),
    format!(
      "last activity: {}",
      summary
        .last_activity_at
        .map_or_else(|| "-".to_owned(), |t| t.to_rfc3339())
    ),
  ]
}

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<String> {
  Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone as _, Utc};
  use scroll_core::{
    capability::ProtocolVersion,
    info::{InfoEventKind, SenderOrigin, UnknownProtocolVersion},
    record::{MessageContent, NewRecord, SortId},
  };
  use uuid::Uuid;

  use super::*;

  #[test]
  fn unread_message_line() {
    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let record =
      NewRecord::incoming(Uuid::nil(), "alice", MessageContent::text("hi"), at, at)
        .into_record(Uuid::from_u128(1), SortId(7))
        .unwrap();
    let line = record_line(&record, &Capabilities::default());
    assert!(line.starts_with("*     7  2023-11-14"));
    assert!(line.ends_with("incoming  hi"));
  }

  #[test]
  fn unsupported_marker_follows_capability() {
    let at = Utc.timestamp_opt(0, 0).unwrap();
    let record = NewRecord::info(
      Uuid::nil(),
      InfoEventKind::UnknownProtocolVersion(UnknownProtocolVersion {
        protocol_version: ProtocolVersion(2),
        origin:           SenderOrigin::Remote("bob".into()),
      }),
      at,
      at,
    )
    .into_record(Uuid::from_u128(1), SortId(1))
    .unwrap();

    let old = record_line(&record, &Capabilities::new(1));
    assert!(old.contains("unknown_protocol_version [unsupported]"));
    let new = record_line(&record, &Capabilities::new(2));
    assert!(!new.contains("[unsupported]"));
  }
}
