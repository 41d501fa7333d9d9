use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use xxhash_rust::xxh3::Xxh3;

use super::{BundleBehavior, JSONObject, Symbol};
use crate::environment::Environment;
use crate::project_path::ProjectPath;

/// A dependency denotes a connection between two assets, discovered by a
/// transformer while processing the source asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
  /// The import or export specifier that connects two assets together.
  pub specifier: String,

  /// How the specifier should be interpreted.
  #[serde(default)]
  pub specifier_type: SpecifierType,

  /// Determines when the dependency should be loaded.
  #[serde(default)]
  pub priority: Priority,

  /// Controls the behavior of the bundle the resolved asset is placed into.
  #[serde(default)]
  pub bundle_behavior: BundleBehavior,

  /// The environment of the dependency. Defaults to the source asset's
  /// environment when the dependency is added.
  #[serde(default)]
  pub env: Option<Arc<Environment>>,

  /// Where the dependency should be resolved from. Defaults to the path of
  /// the source asset. Project-relative inside the core; absolute at the
  /// plugin boundary.
  #[serde(default)]
  pub resolve_from: Option<ProjectPath>,

  /// The named pipeline the resolved asset should be processed with.
  #[serde(default)]
  pub pipeline: Option<String>,

  /// The semver range expected for the dependency, if any.
  #[serde(default)]
  pub range: Option<String>,

  /// Plugin-specific metadata for the dependency.
  #[serde(default)]
  pub meta: JSONObject,

  #[serde(default)]
  pub symbols: Vec<Symbol>,

  /// Hashed id, assigned when the dependency is attached to an asset.
  #[serde(default)]
  pub id: Option<String>,

  /// The id of the asset with this dependency.
  #[serde(default)]
  pub source_asset_id: Option<String>,

  /// The file path of the asset with this dependency.
  #[serde(default)]
  pub source_path: Option<ProjectPath>,
}

impl Dependency {
  pub fn new(specifier: impl Into<String>) -> Dependency {
    Dependency {
      specifier: specifier.into(),
      specifier_type: SpecifierType::default(),
      priority: Priority::default(),
      bundle_behavior: BundleBehavior::default(),
      env: None,
      resolve_from: None,
      pipeline: None,
      range: None,
      meta: JSONObject::new(),
      symbols: Vec::new(),
      id: None,
      source_asset_id: None,
      source_path: None,
    }
  }

  /// Computes the hashed dependency id from its identity-bearing fields.
  pub fn compute_id(&self) -> String {
    let mut hasher = Xxh3::default();
    self.specifier.hash(&mut hasher);
    self.specifier_type.hash(&mut hasher);
    self.priority.hash(&mut hasher);
    self.bundle_behavior.hash(&mut hasher);
    if let Some(env) = &self.env {
      env.hash(&mut hasher);
    }
    self.pipeline.hash(&mut hasher);
    self.source_path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }
}

/// The type of the import specifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SpecifierType {
  /// An ES module specifier. Parsed as a URL, but bare specifiers are
  /// treated as package names.
  Esm = 0,
  /// A CommonJS specifier. Not parsed as a URL.
  CommonJS = 1,
  /// A URL that works as in a browser.
  Url = 2,
  /// A custom specifier handled by a resolver plugin.
  Custom = 3,
}

impl Default for SpecifierType {
  fn default() -> Self {
    SpecifierType::Esm
  }
}

/// Determines when a dependency should load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Priority {
  Sync = 0,
  Parallel = 1,
  Lazy = 2,
}

impl Default for Priority {
  fn default() -> Self {
    Priority::Sync
  }
}
