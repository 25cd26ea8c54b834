//! The info-event variant set: system-generated records that sit in a
//! thread's history alongside ordinary messages.
//!
//! The set is closed: [`InfoEventKind`] is the only place a new kind can be
//! added, and its [`InfoEventKind::message_type`] and
//! [`InfoEventKind::describe`] matches are exhaustive so a new variant must
//! supply both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
  capability::{Capabilities, ProtocolVersion},
  migrate::INFO_EVENT_SCHEMA_VERSION,
  Error, Result,
};

// ─── Tag ─────────────────────────────────────────────────────────────────────

/// The closed tag identifying which kind of system event an info record is.
/// The string form is the `info_type` discriminant stored by backends.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InfoMessageType {
  SessionEnded,
  UserNotRegistered,
  UnsupportedMessage,
  GroupUpdate,
  GroupQuit,
  DisappearingMessagesUpdate,
  VerificationStateChange,
  UnknownProtocolVersion,
  UserJoined,
  ProfileUpdate,
}

// ─── Sender origin ───────────────────────────────────────────────────────────

/// Who produced the content an info record is about.
///
/// Persisted as a nullable `sender_id`: `null` means the content came from
/// one of the current user's own linked devices, never "sender unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum SenderOrigin {
  /// A remote peer, identified by its sender id.
  Remote(String),
  /// Another device registered to the current user's account.
  LinkedDevice,
}

impl SenderOrigin {
  /// Resolve the origin from what an envelope decoder reports.
  ///
  /// The linked-device flag wins: a sync message from one of our own devices
  /// carries our own id, which is not a remote sender.
  pub fn from_envelope(
    is_from_linked_device: bool,
    sender_id: Option<String>,
  ) -> Result<Self> {
    if is_from_linked_device {
      return Ok(Self::LinkedDevice);
    }
    match sender_id {
      Some(id) if id.trim().is_empty() => Err(Error::EmptySenderId),
      Some(id) => Ok(Self::Remote(id)),
      None => Err(Error::MissingField("sender_id")),
    }
  }

  pub fn sender_id(&self) -> Option<&str> {
    match self {
      Self::Remote(id) => Some(id),
      Self::LinkedDevice => None,
    }
  }

  pub fn is_linked_device(&self) -> bool {
    matches!(self, Self::LinkedDevice)
  }
}

impl From<Option<String>> for SenderOrigin {
  fn from(sender_id: Option<String>) -> Self {
    sender_id.map_or(Self::LinkedDevice, Self::Remote)
  }
}

impl From<SenderOrigin> for Option<String> {
  fn from(origin: SenderOrigin) -> Self {
    match origin {
      SenderOrigin::Remote(id) => Some(id),
      SenderOrigin::LinkedDevice => None,
    }
  }
}

// ─── Unknown protocol version ────────────────────────────────────────────────

/// A peer sent content at a protocol version this client did not understand
/// when the content arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownProtocolVersion {
  pub protocol_version: ProtocolVersion,
  #[serde(rename = "sender_id")]
  pub origin:           SenderOrigin,
}

impl UnknownProtocolVersion {
  /// Computed against the capability in force *now*, never stored: once the
  /// client is upgraded past `protocol_version`, historical records stop
  /// reporting as unknown without being rewritten.
  pub fn is_protocol_version_unknown(&self, capabilities: &Capabilities) -> bool {
    !capabilities.supports(self.protocol_version)
  }

  pub fn describe(&self, capabilities: &Capabilities) -> String {
    let v = self.protocol_version;
    match (&self.origin, self.is_protocol_version_unknown(capabilities)) {
      (SenderOrigin::Remote(id), true) => format!(
        "{id} sent a message using protocol version {v}, which this client \
         does not support. Update to read it."
      ),
      (SenderOrigin::LinkedDevice, true) => format!(
        "One of your linked devices sent a message using protocol version \
         {v}, which this client does not support. Update to read it."
      ),
      (SenderOrigin::Remote(id), false) => format!(
        "{id} sent a message that could not be processed earlier. Ask them \
         to send it again."
      ),
      (SenderOrigin::LinkedDevice, false) => {
        "A message from one of your linked devices could not be processed \
         earlier."
          .to_owned()
      }
    }
  }
}

// ─── InfoEventKind ───────────────────────────────────────────────────────────

/// The event-specific payload of an info record. The variant selects the
/// [`InfoMessageType`] tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum InfoEventKind {
  SessionEnded,
  UserNotRegistered {
    recipient_id: String,
  },
  UnsupportedMessage,
  GroupUpdate {
    summary: Option<String>,
  },
  GroupQuit,
  DisappearingMessagesUpdate {
    expires_in_seconds: u32,
  },
  VerificationStateChange {
    verified: bool,
  },
  UnknownProtocolVersion(UnknownProtocolVersion),
  UserJoined,
  ProfileUpdate,
}

impl InfoEventKind {
  pub fn message_type(&self) -> InfoMessageType {
    match self {
      Self::SessionEnded => InfoMessageType::SessionEnded,
      Self::UserNotRegistered { .. } => InfoMessageType::UserNotRegistered,
      Self::UnsupportedMessage => InfoMessageType::UnsupportedMessage,
      Self::GroupUpdate { .. } => InfoMessageType::GroupUpdate,
      Self::GroupQuit => InfoMessageType::GroupQuit,
      Self::DisappearingMessagesUpdate { .. } => {
        InfoMessageType::DisappearingMessagesUpdate
      }
      Self::VerificationStateChange { .. } => {
        InfoMessageType::VerificationStateChange
      }
      Self::UnknownProtocolVersion(_) => InfoMessageType::UnknownProtocolVersion,
      Self::UserJoined => InfoMessageType::UserJoined,
      Self::ProfileUpdate => InfoMessageType::ProfileUpdate,
    }
  }

  /// Human-readable one-line summary.
  pub fn describe(&self, capabilities: &Capabilities) -> String {
    match self {
      Self::SessionEnded => "Secure session was reset.".to_owned(),
      Self::UserNotRegistered { recipient_id } => {
        format!("{recipient_id} is no longer registered.")
      }
      Self::UnsupportedMessage => {
        "Received a message this client cannot display.".to_owned()
      }
      Self::GroupUpdate { summary } => summary
        .clone()
        .unwrap_or_else(|| "Group was updated.".to_owned()),
      Self::GroupQuit => "You left the group.".to_owned(),
      Self::DisappearingMessagesUpdate { expires_in_seconds: 0 } => {
        "Disappearing messages were turned off.".to_owned()
      }
      Self::DisappearingMessagesUpdate { expires_in_seconds } => format!(
        "Disappearing message timer set to {}.",
        format_duration(*expires_in_seconds)
      ),
      Self::VerificationStateChange { verified: true } => {
        "Safety number marked as verified.".to_owned()
      }
      Self::VerificationStateChange { verified: false } => {
        "Safety number marked as not verified.".to_owned()
      }
      Self::UnknownProtocolVersion(u) => u.describe(capabilities),
      Self::UserJoined => "Contact joined.".to_owned(),
      Self::ProfileUpdate => "Profile was updated.".to_owned(),
    }
  }

  pub fn as_unknown_protocol(&self) -> Option<&UnknownProtocolVersion> {
    match self {
      Self::UnknownProtocolVersion(u) => Some(u),
      _ => None,
    }
  }

  /// Variant-specific field checks; the record-level slot checks live in
  /// [`crate::record::NewRecord::validate`].
  pub(crate) fn validate(&self) -> Result<()> {
    match self {
      Self::UserNotRegistered { recipient_id }
        if recipient_id.trim().is_empty() =>
      {
        Err(Error::MissingField("recipient_id"))
      }
      Self::UnknownProtocolVersion(UnknownProtocolVersion {
        origin: SenderOrigin::Remote(id),
        ..
      }) if id.trim().is_empty() => Err(Error::EmptySenderId),
      _ => Ok(()),
    }
  }
}

fn format_duration(seconds: u32) -> String {
  const UNITS: [(u32, &str); 4] =
    [(604_800, "week"), (86_400, "day"), (3_600, "hour"), (60, "minute")];
  for (size, unit) in UNITS {
    if seconds >= size && seconds % size == 0 {
      let n = seconds / size;
      return format!("{n} {unit}{}", if n == 1 { "" } else { "s" });
    }
  }
  format!("{seconds} second{}", if seconds == 1 { "" } else { "s" })
}

// ─── InfoEvent ───────────────────────────────────────────────────────────────

/// The info-specific part of a record: the event payload plus the fields
/// every info event shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoEvent {
  pub event:          InfoEventKind,
  pub custom_message: Option<String>,
  pub read:           bool,
  pub read_at:        Option<DateTime<Utc>>,
  /// Generated without notifying the user; never counts as unread.
  pub silent:         bool,
  /// Payload layout version, independent of the record-wide
  /// `schema_version`.
  pub schema_version: u32,
}

impl InfoEvent {
  /// A fresh, unread event stamped with the current payload schema version.
  pub fn new(event: InfoEventKind) -> Self {
    Self {
      event,
      custom_message: None,
      read: false,
      read_at: None,
      silent: false,
      schema_version: INFO_EVENT_SCHEMA_VERSION,
    }
  }

  pub fn message_type(&self) -> InfoMessageType { self.event.message_type() }

  pub fn describe(&self, capabilities: &Capabilities) -> String {
    match &self.custom_message {
      Some(message) => message.clone(),
      None => self.event.describe(capabilities),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr as _;

  use strum::IntoEnumIterator as _;

  use super::*;

  fn unknown(v: u32, origin: SenderOrigin) -> UnknownProtocolVersion {
    UnknownProtocolVersion { protocol_version: ProtocolVersion(v), origin }
  }

  #[test]
  fn origin_linked_device_flag_wins() {
    let origin =
      SenderOrigin::from_envelope(true, Some("+15550001111".into())).unwrap();
    assert_eq!(origin, SenderOrigin::LinkedDevice);
    assert_eq!(origin.sender_id(), None);
  }

  #[test]
  fn origin_remote_requires_sender() {
    assert!(matches!(
      SenderOrigin::from_envelope(false, None),
      Err(Error::MissingField("sender_id"))
    ));
    assert!(matches!(
      SenderOrigin::from_envelope(false, Some("  ".into())),
      Err(Error::EmptySenderId)
    ));
    let origin = SenderOrigin::from_envelope(false, Some("bob".into())).unwrap();
    assert_eq!(origin.sender_id(), Some("bob"));
  }

  #[test]
  fn origin_persists_as_nullable_sender_id() {
    let linked = serde_json::to_value(unknown(5, SenderOrigin::LinkedDevice))
      .unwrap();
    assert_eq!(linked["sender_id"], serde_json::Value::Null);

    let remote =
      serde_json::to_value(unknown(5, SenderOrigin::Remote("bob".into())))
        .unwrap();
    assert_eq!(remote["sender_id"], "bob");

    let back: UnknownProtocolVersion = serde_json::from_value(linked).unwrap();
    assert!(back.origin.is_linked_device());
  }

  #[test]
  fn unknown_flag_is_monotone_in_capability() {
    let record = unknown(5, SenderOrigin::LinkedDevice);
    let flags: Vec<bool> = (0..=8)
      .map(|max| record.is_protocol_version_unknown(&Capabilities::new(max)))
      .collect();
    // Once cleared by a higher capability it never comes back.
    assert!(flags.windows(2).all(|w| w[0] || !w[1]));
    assert!(flags[4]);
    assert!(!flags[5]);
  }

  #[test]
  fn unknown_description_changes_after_upgrade() {
    let record = unknown(5, SenderOrigin::Remote("bob".into()));
    let before = record.describe(&Capabilities::new(3));
    let after = record.describe(&Capabilities::new(5));
    assert!(before.contains("protocol version 5"));
    assert!(after.contains("send it again"));
  }

  #[test]
  fn message_type_round_trips_through_strum() {
    for ty in InfoMessageType::iter() {
      assert_eq!(InfoMessageType::from_str(ty.as_ref()).unwrap(), ty);
    }
    assert_eq!(
      InfoMessageType::UnknownProtocolVersion.as_ref(),
      "unknown_protocol_version"
    );
  }

  #[test]
  fn serde_tag_matches_strum_discriminant() {
    let kind = InfoEventKind::DisappearingMessagesUpdate { expires_in_seconds: 60 };
    let json = serde_json::to_value(&kind).unwrap();
    assert_eq!(json["message_type"], kind.message_type().as_ref());
  }

  #[test]
  fn disappearing_timer_description() {
    let caps = Capabilities::default();
    let d = |s| {
      InfoEventKind::DisappearingMessagesUpdate { expires_in_seconds: s }
        .describe(&caps)
    };
    assert_eq!(d(0), "Disappearing messages were turned off.");
    assert_eq!(d(3_600), "Disappearing message timer set to 1 hour.");
    assert_eq!(d(1_209_600), "Disappearing message timer set to 2 weeks.");
    assert_eq!(d(90), "Disappearing message timer set to 90 seconds.");
  }

  #[test]
  fn custom_message_overrides_description() {
    let mut event = InfoEvent::new(InfoEventKind::GroupQuit);
    event.custom_message = Some("Alice left.".into());
    assert_eq!(event.describe(&Capabilities::default()), "Alice left.");
  }

  #[test]
  fn empty_recipient_is_rejected() {
    let kind = InfoEventKind::UserNotRegistered { recipient_id: String::new() };
    assert!(matches!(kind.validate(), Err(Error::MissingField("recipient_id"))));
  }
}
