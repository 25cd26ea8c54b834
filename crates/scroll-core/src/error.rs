//! Error types for `scroll-core`.

use thiserror::Error;

use crate::{info::InfoMessageType, migrate::SchemaScope};

#[derive(Debug, Error)]
pub enum Error {
  // ── Validation ──────────────────────────────────────────────────────────
  #[error("{message_type} info records cannot carry {slot}")]
  ContentOnInfoRecord {
    message_type: InfoMessageType,
    slot:         &'static str,
  },

  #[error("a link preview requires a message body")]
  LinkPreviewWithoutBody,

  #[error("a sticker cannot be combined with a body or attachments")]
  StickerWithOtherContent,

  #[error("a view-once message needs at least one attachment")]
  ViewOnceWithoutAttachments,

  #[error("view-once completion set on a message that is not view-once")]
  ViewOnceCompleteWithoutFlag,

  #[error("message has no body, attachments, sticker or contact")]
  EmptyContent,

  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("remote sender id must not be empty")]
  EmptySenderId,

  // ── Mutation ────────────────────────────────────────────────────────────
  #[error("{mutation} does not apply to {record_type} records")]
  MutationNotApplicable {
    mutation:    &'static str,
    record_type: &'static str,
  },

  #[error("expiration timer started at {started_at} runs past the representable range")]
  ExpirationOutOfRange { started_at: chrono::DateTime<chrono::Utc> },

  // ── Load ────────────────────────────────────────────────────────────────
  #[error("stored record violates record invariants: {0}")]
  CorruptRecord(#[source] Box<Error>),

  #[error("info_type column {column:?} disagrees with payload type {payload:?}")]
  InfoTypeMismatch {
    column:  Option<InfoMessageType>,
    payload: Option<InfoMessageType>,
  },

  #[error("{scope} schema version {stored} is newer than supported {current}")]
  SchemaFromFuture {
    scope:   SchemaScope,
    stored:  u32,
    current: u32,
  },

  #[error("unknown record type discriminant: {0:?}")]
  UnknownRecordType(String),

  #[error("stored fields are not a JSON object: {0}")]
  MalformedFields(&'static str),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the error is a construction-time validation failure, i.e. the
  /// record was rejected before anything was persisted.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::ContentOnInfoRecord { .. }
        | Self::LinkPreviewWithoutBody
        | Self::StickerWithOtherContent
        | Self::ViewOnceWithoutAttachments
        | Self::ViewOnceCompleteWithoutFlag
        | Self::EmptyContent
        | Self::MissingField(_)
        | Self::EmptySenderId
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
