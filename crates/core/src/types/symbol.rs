use serde::{Deserialize, Serialize};

/// An exported symbol of an asset, as reported by a transformer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
  /// The name the symbol is exported as.
  pub exported: String,
  /// The name of the binding within the asset.
  pub local: String,
  /// Weak symbols are re-exports that may be shadowed by a stronger export.
  #[serde(default)]
  pub is_weak: bool,
}
