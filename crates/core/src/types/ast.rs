use serde::{Deserialize, Serialize};

/// An opaque parsed representation of an asset.
///
/// The tree itself is an opaque byte buffer produced and consumed by
/// transformer plugins; the core only moves it around, persists it, and
/// tracks whether it has diverged from the asset's content. `plugin` and
/// `version` let a downstream transformer decide whether it can reuse the
/// tree instead of reparsing generated content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ast {
  pub plugin: String,
  pub version: String,
  #[serde(with = "serde_bytes")]
  pub program: Vec<u8>,
}

impl Ast {
  pub fn new(plugin: impl Into<String>, version: impl Into<String>, program: Vec<u8>) -> Self {
    Ast {
      plugin: plugin.into(),
      version: version.into(),
      program,
    }
  }
}
