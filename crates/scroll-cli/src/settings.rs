//! Layered runtime configuration: an optional TOML file, then `SCROLL_*`
//! environment variables.
//!
//! ```toml
//! store_path = "~/.local/share/scroll/history.db"
//!
//! [capabilities]
//! max_supported_protocol_version = 1
//!
//! [thread_policy]
//! excluded_info_types = ["unknown_protocol_version"]
//! ```
//!
//! Nested keys are addressed with a double underscore in the environment,
//! e.g. `SCROLL_CAPABILITIES__MAX_SUPPORTED_PROTOCOL_VERSION=2`.

use std::path::{Path, PathBuf};

use config::{
  builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File,
};
use scroll_core::{capability::Capabilities, store::ThreadPolicy};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:    PathBuf,
  #[serde(default)]
  pub capabilities:  Capabilities,
  #[serde(default)]
  pub thread_policy: ThreadPolicy,
}

fn default_store_path() -> PathBuf { PathBuf::from("scroll.db") }

impl Settings {
  /// Read `path` if it exists, then overlay the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_builder(
      Config::builder().add_source(File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: ConfigBuilder<DefaultState>,
  ) -> Result<Self, ConfigError> {
    builder
      .add_source(
        Environment::with_prefix("SCROLL")
          .separator("__")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("thread_policy.excluded_info_types"),
      )
      .build()?
      .try_deserialize()
  }

  /// The store path with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
