use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::{Ast, Dependency, FileType, JSONObject, Symbol};
use crate::bitflags_serde;
use crate::environment::Environment;
use crate::hash::{hash_object, hash_string};
use crate::project_path::ProjectPath;

/// The committed value record of an asset produced by a transformation.
///
/// Content, source map, and AST live in the content cache once the asset has
/// been committed (the `*_key` fields); when the cache is bypassed they are
/// carried inline instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
  pub id: String,
  pub file_path: ProjectPath,
  #[serde(rename = "type")]
  pub file_type: FileType,
  pub env: Arc<Environment>,
  #[serde(default)]
  pub query: Option<IndexMap<String, String>>,
  #[serde(default)]
  pub pipeline: Option<String>,
  pub flags: AssetFlags,
  #[serde(default)]
  pub bundle_behavior: BundleBehavior,

  /// Content hash of the source the asset was loaded from. Inherited by
  /// child assets so cache keys reflect the originating content.
  #[serde(default)]
  pub hash: Option<String>,
  /// Content hash of the produced output, set when the asset is finalized.
  #[serde(default)]
  pub output_hash: Option<String>,

  #[serde(default)]
  pub content_key: Option<String>,
  #[serde(default)]
  pub map_key: Option<String>,
  #[serde(default)]
  pub ast_key: Option<String>,
  #[serde(default, with = "serde_bytes")]
  pub content: Option<Vec<u8>>,
  #[serde(default, with = "serde_bytes")]
  pub map: Option<Vec<u8>>,
  #[serde(default)]
  pub ast: Option<Ast>,
  #[serde(default)]
  pub is_ast_dirty: bool,

  #[serde(default)]
  pub unique_key: Option<String>,
  #[serde(default)]
  pub stats: AssetStats,
  #[serde(default)]
  pub symbols: Vec<Symbol>,
  #[serde(default)]
  pub dependencies: Vec<Dependency>,
  #[serde(default)]
  pub meta: JSONObject,

  /// Provenance: the transformer that produced this asset and where its
  /// configuration came from.
  #[serde(default)]
  pub plugin: Option<String>,
  #[serde(default)]
  pub config_path: Option<ProjectPath>,
  #[serde(default)]
  pub config_key_path: Option<String>,
}

impl Asset {
  pub fn is_source(&self) -> bool {
    self.flags.contains(AssetFlags::IS_SOURCE)
  }

  pub fn side_effects(&self) -> bool {
    self.flags.contains(AssetFlags::SIDE_EFFECTS)
  }
}

/// Computes the stable asset id from the identity-bearing parts of the
/// value record. The `id_base` comes from the initial source (content hash
/// for inline code, relative path otherwise), so assets derived from the
/// same source in the same role share ids across builds.
pub fn create_asset_id(
  id_base: &str,
  file_type: &FileType,
  env: &Environment,
  pipeline: Option<&str>,
  query: Option<&IndexMap<String, String>>,
  unique_key: Option<&str>,
) -> String {
  let env_hash = hash_object(env).expect("environment is serializable");
  let mut input = String::new();
  input.push_str(id_base);
  input.push_str(file_type.extension());
  input.push_str(&env_hash);
  input.push_str(unique_key.unwrap_or(""));
  input.push(':');
  input.push_str(pipeline.unwrap_or(""));
  input.push(':');
  if let Some(query) = query {
    let mut entries: Vec<(&String, &String)> = query.iter().collect();
    entries.sort();
    for (key, value) in entries {
      input.push_str(key);
      input.push('=');
      input.push_str(value);
      input.push('&');
    }
  }
  hash_string(&input)
}

bitflags! {
  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
  pub struct AssetFlags: u8 {
    const IS_SOURCE = 1 << 0;
    const SIDE_EFFECTS = 1 << 1;
    const IS_BUNDLE_SPLITTABLE = 1 << 2;
  }
}

bitflags_serde!(AssetFlags, u8);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStats {
  pub size: u32,
  pub time: u32,
}

/// Controls the behavior of the bundle the asset is placed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum BundleBehavior {
  None = 0,
  /// Inlined into the parent bundle instead of emitted separately.
  Inline = 1,
  /// Always placed into its own bundle.
  Isolated = 2,
}

impl Default for BundleBehavior {
  fn default() -> Self {
    BundleBehavior::None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::environment::Environment;

  #[test]
  fn asset_ids_are_stable_and_sensitive() {
    let env = Environment::default();
    let id = create_asset_id("base", &FileType::Js, &env, None, None, None);
    assert_eq!(
      id,
      create_asset_id("base", &FileType::Js, &env, None, None, None)
    );
    assert_ne!(
      id,
      create_asset_id("base", &FileType::Css, &env, None, None, None)
    );
    assert_ne!(
      id,
      create_asset_id("base", &FileType::Js, &env, Some("url"), None, None)
    );
  }

  #[test]
  fn query_order_does_not_change_the_id() {
    let env = Environment::default();
    let mut a = IndexMap::new();
    a.insert("a".to_string(), "1".to_string());
    a.insert("b".to_string(), "2".to_string());
    let mut b = IndexMap::new();
    b.insert("b".to_string(), "2".to_string());
    b.insert("a".to_string(), "1".to_string());
    assert_eq!(
      create_asset_id("base", &FileType::Js, &env, None, Some(&a), None),
      create_asset_id("base", &FileType::Js, &env, None, Some(&b), None)
    );
  }
}
