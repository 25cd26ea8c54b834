//! Protocol-compatibility gate.
//!
//! Runs at ingest, once an external decoder has determined the protocol
//! version of an incoming message. Content at a version this client
//! supports proceeds to normal processing; anything newer is replaced by an
//! unknown-protocol-version info record in the thread's history.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  capability::{Capabilities, ProtocolVersion},
  info::{InfoEventKind, SenderOrigin, UnknownProtocolVersion},
  record::{NewRecord, Record},
  store::HistoryStore,
  Result,
};

/// What the decoder knows about an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEnvelope {
  pub protocol_version:      ProtocolVersion,
  pub is_from_linked_device: bool,
  pub sender_id:             Option<String>,
  /// Sender-claimed timestamp.
  pub timestamp:             DateTime<Utc>,
  pub thread_id:             Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
  /// The content is understood; process it normally.
  Proceed,
  /// The content is too new; persist this record instead.
  Unsupported(NewRecord),
}

/// Compares incoming protocol versions against an injected capability.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolGate {
  capabilities: Capabilities,
}

impl ProtocolGate {
  pub fn new(capabilities: Capabilities) -> Self { Self { capabilities } }

  pub fn capabilities(&self) -> &Capabilities { &self.capabilities }

  /// Decide what to do with `envelope`, observed locally at `received_at`.
  ///
  /// Pure; nothing is persisted.
  pub fn evaluate(
    &self,
    envelope: &IncomingEnvelope,
    received_at: DateTime<Utc>,
  ) -> Result<GateDecision> {
    if self.capabilities.supports(envelope.protocol_version) {
      return Ok(GateDecision::Proceed);
    }

    let origin = SenderOrigin::from_envelope(
      envelope.is_from_linked_device,
      envelope.sender_id.clone(),
    )?;
    let record = NewRecord::info(
      envelope.thread_id,
      InfoEventKind::UnknownProtocolVersion(UnknownProtocolVersion {
        protocol_version: envelope.protocol_version,
        origin,
      }),
      envelope.timestamp,
      received_at,
    );
    record.validate()?;
    Ok(GateDecision::Unsupported(record))
  }

  /// Evaluate `envelope` and, if it is too new, persist the resulting
  /// record. Returns `None` when the message should be processed normally.
  ///
  /// The record is ordered by arrival: unsupported content carries no
  /// ordering metadata worth trusting.
  pub async fn ingest<S>(
    &self,
    store: &S,
    envelope: &IncomingEnvelope,
  ) -> Result<Option<Record>, S::Error>
  where
    S: HistoryStore,
    S::Error: From<crate::Error>,
  {
    match self.evaluate(envelope, Utc::now())? {
      GateDecision::Proceed => Ok(None),
      GateDecision::Unsupported(input) => store.create(input).await.map(Some),
    }
  }

  /// Whether `record` is an unknown-protocol record this client still
  /// cannot read. Re-evaluated against the current capability every time.
  pub fn is_unknown(&self, record: &Record) -> bool {
    record
      .unknown_protocol()
      .is_some_and(|u| u.is_protocol_version_unknown(&self.capabilities))
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;
  use crate::{
    Error,
    info::InfoMessageType,
    record::{RecordKind, SortId},
  };

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn envelope(v: u32, linked: bool, sender: Option<&str>) -> IncomingEnvelope {
    IncomingEnvelope {
      protocol_version:      ProtocolVersion(v),
      is_from_linked_device: linked,
      sender_id:             sender.map(str::to_owned),
      timestamp:             at(1_000),
      thread_id:             Uuid::from_u128(42),
    }
  }

  fn unsupported(decision: GateDecision) -> NewRecord {
    match decision {
      GateDecision::Unsupported(r) => r,
      GateDecision::Proceed => panic!("expected an unsupported decision"),
    }
  }

  #[test]
  fn supported_versions_proceed() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    for v in 0..=3 {
      for linked in [false, true] {
        let decision = gate.evaluate(&envelope(v, linked, Some("bob")), at(2_000));
        assert_eq!(decision.unwrap(), GateDecision::Proceed);
      }
    }
  }

  #[test]
  fn supported_version_needs_no_sender() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    let decision = gate.evaluate(&envelope(2, false, None), at(2_000)).unwrap();
    assert_eq!(decision, GateDecision::Proceed);
  }

  #[test]
  fn newer_version_from_linked_device() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    let input = unsupported(gate.evaluate(&envelope(5, true, None), at(2_000)).unwrap());

    assert_eq!(input.thread_id, Uuid::from_u128(42));
    assert_eq!(input.timestamp, at(1_000));
    assert_eq!(input.received_at, at(2_000));

    let record = input.into_record(Uuid::from_u128(1), SortId(1)).unwrap();
    let unknown = record.unknown_protocol().unwrap();
    assert_eq!(unknown.protocol_version, ProtocolVersion(5));
    assert_eq!(unknown.origin, SenderOrigin::LinkedDevice);
    assert!(gate.is_unknown(&record));

    // After an upgrade the same record reads as resolved.
    let upgraded = ProtocolGate::new(Capabilities::new(5));
    assert!(!upgraded.is_unknown(&record));
  }

  #[test]
  fn newer_version_from_remote_peer_keeps_sender() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    let input =
      unsupported(gate.evaluate(&envelope(4, false, Some("bob")), at(2_000)).unwrap());
    let RecordKind::Info(info) = &input.kind else {
      panic!("expected an info record");
    };
    assert_eq!(info.message_type(), InfoMessageType::UnknownProtocolVersion);
    assert_eq!(
      info.event.as_unknown_protocol().unwrap().origin,
      SenderOrigin::Remote("bob".into())
    );
  }

  #[test]
  fn newer_version_from_unidentified_peer_is_rejected() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    let err = gate.evaluate(&envelope(4, false, None), at(2_000)).unwrap_err();
    assert!(matches!(err, Error::MissingField("sender_id")));
  }

  #[test]
  fn every_record_built_above_capability_reports_unknown() {
    let gate = ProtocolGate::new(Capabilities::new(3));
    for v in [4, 5, 100, u32::MAX] {
      let input = unsupported(gate.evaluate(&envelope(v, true, None), at(1)).unwrap());
      let record = input.into_record(Uuid::from_u128(1), SortId(1)).unwrap();
      assert!(gate.is_unknown(&record));
    }
  }

  #[test]
  fn ordinary_records_are_never_unknown() {
    let gate = ProtocolGate::new(Capabilities::new(0));
    let record = NewRecord::info(Uuid::nil(), InfoEventKind::GroupQuit, at(1), at(1))
      .into_record(Uuid::from_u128(1), SortId(1))
      .unwrap();
    assert!(!gate.is_unknown(&record));
  }
}
