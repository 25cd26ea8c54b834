//! Record types for one persisted conversation-history entry.
//!
//! Every entry, whether an ordinary message or a system event, shares the
//! base fields of [`Record`]. The variant lives in [`RecordKind`]; the
//! payload slots only some variants may use live in [`MessageContent`] and
//! are checked against the variant in one explicit validation step.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  capability::Capabilities,
  info::{InfoEvent, InfoEventKind, UnknownProtocolVersion},
  migrate::{INFO_EVENT_SCHEMA_VERSION, RECORD_SCHEMA_VERSION},
  Error, Result,
};

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Position of a record within its thread. Assigned by the store's ordering
/// authority; strictly increasing per thread, never reused, gaps allowed.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct SortId(pub u64);

impl SortId {
  pub const fn get(self) -> u64 { self.0 }
}

impl fmt::Display for SortId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Expiration ──────────────────────────────────────────────────────────────

/// Disappearing-message timer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
  /// Zero means the record never expires.
  pub expires_in_seconds: u32,
  pub expire_started_at:  Option<DateTime<Utc>>,
  pub expires_at:         Option<DateTime<Utc>>,
}

impl Expiration {
  pub fn with_timer(expires_in_seconds: u32) -> Self {
    Self { expires_in_seconds, ..Self::default() }
  }

  pub fn has_timer(&self) -> bool { self.expires_in_seconds > 0 }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

// ─── Payload slots ───────────────────────────────────────────────────────────

/// Snapshot of the message being replied to, taken by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedMessage {
  pub timestamp:      DateTime<Utc>,
  pub author_id:      String,
  pub body:           Option<String>,
  pub attachment_ids: Vec<String>,
}

/// A link preview; fetching happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
  pub url:                 String,
  pub title:               Option<String>,
  pub image_attachment_id: Option<String>,
}

/// Reference into a sticker pack; the asset itself is stored elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerRef {
  pub pack_id:       String,
  pub sticker_id:    u32,
  pub attachment_id: String,
}

/// A shared contact card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactShare {
  pub display_name:  String,
  pub phone_numbers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOnce {
  pub is_view_once: bool,
  /// Set once the recipient has viewed the message; the content is dropped
  /// at the same time.
  pub is_complete:  bool,
}

/// Optional payload slots shared by message variants. Info records must
/// leave every slot empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
  pub body:           Option<String>,
  pub attachment_ids: Vec<String>,
  pub quoted_message: Option<QuotedMessage>,
  pub link_preview:   Option<LinkPreview>,
  pub sticker:        Option<StickerRef>,
  pub contact_share:  Option<ContactShare>,
  pub view_once:      ViewOnce,
}

impl MessageContent {
  pub fn text(body: impl Into<String>) -> Self {
    Self { body: Some(body.into()), ..Self::default() }
  }

  /// Name of the first populated slot, if any.
  pub fn first_populated_slot(&self) -> Option<&'static str> {
    if self.body.is_some() {
      Some("body")
    } else if !self.attachment_ids.is_empty() {
      Some("attachment_ids")
    } else if self.quoted_message.is_some() {
      Some("quoted_message")
    } else if self.link_preview.is_some() {
      Some("link_preview")
    } else if self.sticker.is_some() {
      Some("sticker")
    } else if self.contact_share.is_some() {
      Some("contact_share")
    } else if self.view_once != ViewOnce::default() {
      Some("view_once")
    } else {
      None
    }
  }

  pub fn is_empty(&self) -> bool { self.first_populated_slot().is_none() }

  fn validate_for_message(&self) -> Result<()> {
    if self.link_preview.is_some() && self.body.is_none() {
      return Err(Error::LinkPreviewWithoutBody);
    }
    if self.sticker.is_some()
      && (self.body.is_some() || !self.attachment_ids.is_empty())
    {
      return Err(Error::StickerWithOtherContent);
    }
    if self.view_once.is_complete && !self.view_once.is_view_once {
      return Err(Error::ViewOnceCompleteWithoutFlag);
    }
    if self.view_once.is_complete {
      // Consumed view-once messages legitimately carry nothing.
      return Ok(());
    }
    if self.view_once.is_view_once && self.attachment_ids.is_empty() {
      return Err(Error::ViewOnceWithoutAttachments);
    }
    if self.body.is_none()
      && self.attachment_ids.is_empty()
      && self.sticker.is_none()
      && self.contact_share.is_none()
    {
      return Err(Error::EmptyContent);
    }
    Ok(())
  }
}

// ─── Variants ────────────────────────────────────────────────────────────────

/// A message received from another participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
  pub author_id: String,
  pub read:      bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum RecordKind {
  Incoming(IncomingMessage),
  Outgoing,
  Info(InfoEvent),
}

/// Stored discriminant of [`RecordKind`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  AsRefStr,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum RecordType {
  Incoming,
  Outgoing,
  Info,
}

impl RecordKind {
  pub fn record_type(&self) -> RecordType {
    match self {
      Self::Incoming(_) => RecordType::Incoming,
      Self::Outgoing => RecordType::Outgoing,
      Self::Info(_) => RecordType::Info,
    }
  }

  fn validate(&self, content: &MessageContent) -> Result<()> {
    match self {
      Self::Info(info) => {
        if let Some(slot) = content.first_populated_slot() {
          return Err(Error::ContentOnInfoRecord {
            message_type: info.message_type(),
            slot,
          });
        }
        info.event.validate()
      }
      Self::Incoming(m) => {
        if m.author_id.trim().is_empty() {
          return Err(Error::MissingField("author_id"));
        }
        content.validate_for_message()
      }
      Self::Outgoing => content.validate_for_message(),
    }
  }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// The only sanctioned post-construction writes to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
  MarkRead { at: DateTime<Utc> },
  StartExpiration { started_at: DateTime<Utc> },
  CompleteViewOnce,
}

impl Mutation {
  pub fn name(&self) -> &'static str {
    match self {
      Self::MarkRead { .. } => "mark_read",
      Self::StartExpiration { .. } => "start_expiration",
      Self::CompleteViewOnce => "complete_view_once",
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One persisted history entry.
///
/// `unique_id`, `sort_id`, `thread_id` and both timestamps never change after
/// creation. Everything else changes only through [`Record::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  pub unique_id:      Uuid,
  pub thread_id:      Uuid,
  pub sort_id:        SortId,
  /// Record layout version of the code that last wrote this record.
  pub schema_version: u32,
  /// Sender-claimed send time.
  pub timestamp:      DateTime<Utc>,
  /// Local observation time.
  pub received_at:    DateTime<Utc>,
  pub expiration:     Expiration,
  pub content:        MessageContent,
  pub kind:           RecordKind,
}

impl Record {
  pub fn record_type(&self) -> RecordType { self.kind.record_type() }

  pub fn info(&self) -> Option<&InfoEvent> {
    match &self.kind {
      RecordKind::Info(info) => Some(info),
      _ => None,
    }
  }

  pub fn unknown_protocol(&self) -> Option<&UnknownProtocolVersion> {
    self.info().and_then(|info| info.event.as_unknown_protocol())
  }

  /// Whether the record is waiting to be read. Silent info events and
  /// outgoing messages never are.
  pub fn is_unread(&self) -> bool {
    match &self.kind {
      RecordKind::Incoming(m) => !m.read,
      RecordKind::Outgoing => false,
      RecordKind::Info(info) => !info.read && !info.silent,
    }
  }

  /// Re-run the construction-time checks, e.g. after a mutation.
  pub fn validate(&self) -> Result<()> { self.kind.validate(&self.content) }

  /// One-line human-readable summary.
  pub fn summary(&self, capabilities: &Capabilities) -> String {
    if let RecordKind::Info(info) = &self.kind {
      return info.describe(capabilities);
    }
    let c = &self.content;
    if c.view_once.is_complete {
      return "[view-once message, viewed]".to_owned();
    }
    if c.view_once.is_view_once {
      return "[view-once message]".to_owned();
    }
    if let Some(body) = &c.body {
      return body.clone();
    }
    if c.sticker.is_some() {
      return "[sticker]".to_owned();
    }
    if let Some(contact) = &c.contact_share {
      return format!("[contact: {}]", contact.display_name);
    }
    match c.attachment_ids.len() {
      1 => "[1 attachment]".to_owned(),
      n => format!("[{n} attachments]"),
    }
  }

  /// Apply a mutation in place. Returns `false` when the record already
  /// reflected it and nothing changed.
  pub fn apply(&mut self, mutation: &Mutation) -> Result<bool> {
    let not_applicable = |record_type: RecordType| Error::MutationNotApplicable {
      mutation:    mutation.name(),
      record_type: record_type.into(),
    };
    let record_type = self.record_type();

    match *mutation {
      Mutation::MarkRead { at } => match &mut self.kind {
        RecordKind::Incoming(m) => Ok(!std::mem::replace(&mut m.read, true)),
        RecordKind::Info(info) => {
          if info.read {
            return Ok(false);
          }
          info.read = true;
          info.read_at = Some(at);
          Ok(true)
        }
        RecordKind::Outgoing => Err(not_applicable(record_type)),
      },

      Mutation::StartExpiration { started_at } => {
        let exp = &mut self.expiration;
        if !exp.has_timer() {
          return Err(not_applicable(record_type));
        }
        if exp.expire_started_at.is_some() {
          return Ok(false);
        }
        let expires_at = started_at
          .checked_add_signed(Duration::seconds(i64::from(exp.expires_in_seconds)))
          .ok_or(Error::ExpirationOutOfRange { started_at })?;
        exp.expire_started_at = Some(started_at);
        exp.expires_at = Some(expires_at);
        Ok(true)
      }

      Mutation::CompleteViewOnce => {
        if matches!(self.kind, RecordKind::Info(_))
          || !self.content.view_once.is_view_once
        {
          return Err(not_applicable(record_type));
        }
        if self.content.view_once.is_complete {
          return Ok(false);
        }
        // Every renderable slot goes with the view.
        self.content = MessageContent {
          view_once: ViewOnce { is_view_once: true, is_complete: true },
          ..MessageContent::default()
        };
        Ok(true)
      }
    }
  }

  /// Stamp the record with the layout versions of the running code, as done
  /// on every write. Versions only ever move forward.
  pub fn restamp(&mut self) {
    self.schema_version = self.schema_version.max(RECORD_SCHEMA_VERSION);
    if let RecordKind::Info(info) = &mut self.kind {
      info.schema_version = info.schema_version.max(INFO_EVENT_SCHEMA_VERSION);
    }
  }
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::HistoryStore::create`].
///
/// `unique_id`, `sort_id` and the schema stamps are always assigned by the
/// store; they are not accepted from callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
  pub thread_id:          Uuid,
  pub timestamp:          DateTime<Utc>,
  pub received_at:        DateTime<Utc>,
  pub expires_in_seconds: u32,
  pub content:            MessageContent,
  pub kind:               RecordKind,
}

impl NewRecord {
  /// An info record observed now-ish; `received_at` is the local clock.
  pub fn info(
    thread_id: Uuid,
    event: InfoEventKind,
    timestamp: DateTime<Utc>,
    received_at: DateTime<Utc>,
  ) -> Self {
    Self {
      thread_id,
      timestamp,
      received_at,
      expires_in_seconds: 0,
      content: MessageContent::default(),
      kind: RecordKind::Info(InfoEvent::new(event)),
    }
  }

  pub fn incoming(
    thread_id: Uuid,
    author_id: impl Into<String>,
    content: MessageContent,
    timestamp: DateTime<Utc>,
    received_at: DateTime<Utc>,
  ) -> Self {
    Self {
      thread_id,
      timestamp,
      received_at,
      expires_in_seconds: 0,
      content,
      kind: RecordKind::Incoming(IncomingMessage {
        author_id: author_id.into(),
        read:      false,
      }),
    }
  }

  pub fn outgoing(
    thread_id: Uuid,
    content: MessageContent,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      thread_id,
      timestamp,
      received_at: timestamp,
      expires_in_seconds: 0,
      content,
      kind: RecordKind::Outgoing,
    }
  }

  /// Check that the variant and its populated payload slots agree.
  pub fn validate(&self) -> Result<()> { self.kind.validate(&self.content) }

  /// Build the record a store will persist once it has assigned identity
  /// and ordering. Validates first; an invalid input never becomes a record.
  pub fn into_record(self, unique_id: Uuid, sort_id: SortId) -> Result<Record> {
    self.validate()?;
    let mut record = Record {
      unique_id,
      thread_id: self.thread_id,
      sort_id,
      schema_version: RECORD_SCHEMA_VERSION,
      timestamp: self.timestamp,
      received_at: self.received_at,
      expiration: Expiration::with_timer(self.expires_in_seconds),
      content: self.content,
      kind: self.kind,
    };
    if let RecordKind::Info(info) = &mut record.kind {
      info.schema_version = INFO_EVENT_SCHEMA_VERSION;
    }
    Ok(record)
  }
}
