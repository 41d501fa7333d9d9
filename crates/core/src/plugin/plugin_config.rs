use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::dev_dep::DevDepSpecifier;
use crate::environment::Environment;
use crate::hash::{hash_object, hash_string};
use crate::invalidation::FileCreateInvalidation;
use crate::project_path::ProjectPath;
use crate::SKEIN_VERSION;

/// An opaque, serializable configuration value produced by a plugin's
/// `load_config`. Serialization may fail (e.g. the value holds state that
/// has no stable representation); plugins whose results are not hashable
/// must set an explicit result hash instead.
pub trait ConfigResult: std::fmt::Debug + Send + Sync {
  fn to_json(&self) -> anyhow::Result<serde_json::Value>;
}

impl ConfigResult for serde_json::Value {
  fn to_json(&self) -> anyhow::Result<serde_json::Value> {
    Ok(self.clone())
  }
}

/// Per-plugin persistent state produced by `load_config`, together with
/// everything that would invalidate it.
#[derive(Debug)]
pub struct PluginConfig {
  id: String,
  plugin_name: String,
  search_path: ProjectPath,
  env: Arc<Environment>,
  is_source: bool,
  result: Option<Box<dyn ConfigResult>>,
  result_hash: Option<String>,
  included_files: IndexSet<ProjectPath>,
  invalidate_on_file_create: Vec<FileCreateInvalidation>,
  should_invalidate_on_startup: bool,
  dev_deps: Vec<DevDepSpecifier>,
}

impl PluginConfig {
  pub fn new(
    plugin_name: impl Into<String>,
    search_path: ProjectPath,
    env: Arc<Environment>,
    is_source: bool,
  ) -> Self {
    let plugin_name = plugin_name.into();
    let env_hash = hash_object(env.as_ref()).expect("environment is serializable");
    let id = hash_string(&format!(
      "{}:{}:{}:{}:{}",
      SKEIN_VERSION, plugin_name, search_path, env_hash, is_source
    ));
    PluginConfig {
      id,
      plugin_name,
      search_path,
      env,
      is_source,
      result: None,
      result_hash: None,
      included_files: IndexSet::new(),
      invalidate_on_file_create: Vec::new(),
      should_invalidate_on_startup: false,
      dev_deps: Vec::new(),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn plugin_name(&self) -> &str {
    &self.plugin_name
  }

  pub fn search_path(&self) -> &ProjectPath {
    &self.search_path
  }

  pub fn env(&self) -> &Arc<Environment> {
    &self.env
  }

  pub fn is_source(&self) -> bool {
    self.is_source
  }

  pub fn set_result(&mut self, result: impl ConfigResult + 'static) {
    self.result = Some(Box::new(result));
  }

  pub fn result(&self) -> Option<&dyn ConfigResult> {
    self.result.as_deref()
  }

  /// Overrides result hashing for plugins whose results cannot be
  /// serialized.
  pub fn set_result_hash(&mut self, hash: impl Into<String>) {
    self.result_hash = Some(hash.into());
  }

  pub fn result_hash(&self) -> Option<&str> {
    self.result_hash.as_deref()
  }

  /// Records a file the configuration was read from.
  pub fn add_included_file(&mut self, file_path: ProjectPath) {
    self.included_files.insert(file_path);
  }

  pub fn included_files(&self) -> &IndexSet<ProjectPath> {
    &self.included_files
  }

  pub fn invalidate_on_file_create(&mut self, invalidation: FileCreateInvalidation) {
    self.invalidate_on_file_create.push(invalidation);
  }

  pub fn file_create_invalidations(&self) -> &[FileCreateInvalidation] {
    &self.invalidate_on_file_create
  }

  pub fn invalidate_on_startup(&mut self) {
    self.should_invalidate_on_startup = true;
  }

  pub fn should_invalidate_on_startup(&self) -> bool {
    self.should_invalidate_on_startup
  }

  /// Declares a build-time dependency of this configuration. Its hash
  /// becomes part of the pipeline hash.
  pub fn add_dev_dependency(&mut self, dev_dep: DevDepSpecifier) {
    self.dev_deps.push(dev_dep);
  }

  pub fn dev_deps(&self) -> &[DevDepSpecifier] {
    &self.dev_deps
  }

  /// A config with no invalidation state does not need to be tracked by
  /// the upstream graph.
  pub fn is_empty(&self) -> bool {
    self.included_files.is_empty()
      && self.invalidate_on_file_create.is_empty()
      && !self.should_invalidate_on_startup
  }
}

/// The serializable invalidation record of a loaded plugin config,
/// returned to the upstream graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
  pub id: String,
  pub plugin_name: String,
  pub search_path: ProjectPath,
  pub is_source: bool,
  pub included_files: Vec<ProjectPath>,
  pub invalidate_on_file_create: Vec<FileCreateInvalidation>,
  pub should_invalidate_on_startup: bool,
}

impl From<&PluginConfig> for ConfigRequest {
  fn from(config: &PluginConfig) -> Self {
    ConfigRequest {
      id: config.id.clone(),
      plugin_name: config.plugin_name.clone(),
      search_path: config.search_path.clone(),
      is_source: config.is_source,
      included_files: config.included_files.iter().cloned().collect(),
      invalidate_on_file_create: config.invalidate_on_file_create.clone(),
      should_invalidate_on_startup: config.should_invalidate_on_startup,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_configs_are_not_tracked() {
    let env = Arc::new(Environment::default());
    let mut config = PluginConfig::new("transformer-ts", "src/app.ts".into(), env, true);
    assert!(config.is_empty());

    config.add_included_file("tsconfig.json".into());
    assert!(!config.is_empty());
  }

  #[test]
  fn startup_invalidation_marks_the_config() {
    let env = Arc::new(Environment::default());
    let mut config = PluginConfig::new("transformer-env", "src/app.ts".into(), env, true);
    config.invalidate_on_startup();
    assert!(!config.is_empty());
    let request = ConfigRequest::from(&config);
    assert!(request.should_invalidate_on_startup);
  }
}
