use std::collections::BTreeSet;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use crate::invalidation::FileCreateInvalidation;
use crate::project_path::ProjectPath;

/// Identifies a build-time dependency: a package specifier and the location
/// it resolves from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevDepSpecifier {
  pub specifier: String,
  pub resolve_from: ProjectPath,
}

impl DevDepSpecifier {
  pub fn key(&self) -> String {
    dev_dep_key(&self.specifier, &self.resolve_from)
  }
}

/// Canonical map key for a dev dependency.
pub fn dev_dep_key(specifier: &str, resolve_from: &ProjectPath) -> String {
  format!("{}:{}", specifier, resolve_from)
}

/// A build-time dependency of a transformer, together with the hash of its
/// file closure and the records that invalidate it.
///
/// When the hash is already known to the upstream graph the request is sent
/// stripped: just the identity and hash, with empty invalidation sets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevDepRequest {
  pub specifier: String,
  pub resolve_from: ProjectPath,
  pub hash: String,
  #[serde(default)]
  pub invalidate_on_file_change: BTreeSet<ProjectPath>,
  #[serde(default)]
  pub invalidate_on_file_create: Vec<FileCreateInvalidation>,
  /// Plugins whose caches must also be dropped when this dependency
  /// changes, typically the transformer that declared it.
  #[serde(default)]
  pub additional_invalidations: Vec<DevDepSpecifier>,
}

impl DevDepRequest {
  pub fn key(&self) -> String {
    dev_dep_key(&self.specifier, &self.resolve_from)
  }

  pub fn stripped(specifier: String, resolve_from: ProjectPath, hash: String) -> Self {
    DevDepRequest {
      specifier,
      resolve_from,
      hash,
      invalidate_on_file_change: BTreeSet::new(),
      invalidate_on_file_create: Vec::new(),
      additional_invalidations: Vec::new(),
    }
  }
}

/// Process-wide state with a build-scoped lifecycle.
///
/// Workers treat these maps as mutable within a build; the scheduler calls
/// `reset` at build boundaries so every build starts empty.
#[derive(Debug, Default)]
pub struct BuildScope {
  /// Dev-dep hashes already sent upstream this build, keyed by specifier.
  /// A matching hash suppresses re-sending the full invalidation payload.
  pub plugin_cache: DashMap<String, String>,
  /// Plugins whose cached resolutions were already dropped this build,
  /// keyed by `specifier:resolveFrom`.
  pub invalidated_plugins: DashSet<String>,
}

impl BuildScope {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reset(&self) {
    self.plugin_cache.clear();
    self.invalidated_plugins.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keys_are_stable() {
    let dep = DevDepSpecifier {
      specifier: "transformer-ts".into(),
      resolve_from: "node_modules/transformer-ts".into(),
    };
    assert_eq!(dep.key(), "transformer-ts:node_modules/transformer-ts");
  }

  #[test]
  fn reset_clears_both_maps() {
    let scope = BuildScope::new();
    scope.plugin_cache.insert("a".into(), "h".into());
    scope.invalidated_plugins.insert("a:b".into());
    scope.reset();
    assert!(scope.plugin_cache.is_empty());
    assert!(scope.invalidated_plugins.is_empty());
  }
}
