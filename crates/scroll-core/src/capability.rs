//! The running client's capability declaration.
//!
//! Protocol versions are opaque to this crate: an external decoder supplies
//! them and the only operation performed on them is an unsigned comparison
//! against [`Capabilities::max_supported_protocol_version`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A peer-declared wire-format capability level.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
  pub const fn get(self) -> u32 { self.0 }
}

impl From<u32> for ProtocolVersion {
  fn from(v: u32) -> Self { Self(v) }
}

impl fmt::Display for ProtocolVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Highest protocol version understood by this build.
pub const BUILTIN_MAX_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion(1);

/// Process-wide capability configuration, read once at startup and injected
/// into everything that compares protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
  pub max_supported_protocol_version: ProtocolVersion,
}

impl Capabilities {
  pub const fn new(max_supported_protocol_version: u32) -> Self {
    Self {
      max_supported_protocol_version: ProtocolVersion(
        max_supported_protocol_version,
      ),
    }
  }

  /// Whether content declared at `version` can be processed normally.
  pub fn supports(&self, version: ProtocolVersion) -> bool {
    version <= self.max_supported_protocol_version
  }
}

impl Default for Capabilities {
  fn default() -> Self {
    Self { max_supported_protocol_version: BUILTIN_MAX_PROTOCOL_VERSION }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn supports_up_to_and_including_max() {
    let caps = Capabilities::new(3);
    assert!(caps.supports(ProtocolVersion(0)));
    assert!(caps.supports(ProtocolVersion(3)));
    assert!(!caps.supports(ProtocolVersion(4)));
  }

  #[test]
  fn comparison_is_unsigned() {
    let caps = Capabilities::new(3);
    assert!(!caps.supports(ProtocolVersion(u32::MAX)));
  }

  #[test]
  fn deserialises_from_plain_integer() {
    let caps: Capabilities =
      serde_json::from_str(r#"{"max_supported_protocol_version": 7}"#).unwrap();
    assert_eq!(caps, Capabilities::new(7));
  }
}
