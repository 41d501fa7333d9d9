use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use glob_match::glob_match;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::plugin::Transformer;
use crate::project_path::ProjectPath;
use crate::resolver::ResolverRef;

/// A plugin reference as written in the project configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginNode {
  pub package_name: String,
  pub resolve_from: ProjectPath,
}

/// Maps glob patterns to ordered transformer lists. Patterns may carry a
/// `name:` prefix that restricts them to a named pipeline.
#[derive(Debug, Default)]
pub struct PipelineMap {
  map: IndexMap<String, Vec<PluginNode>>,
}

impl PipelineMap {
  pub fn new(map: IndexMap<String, Vec<PluginNode>>) -> Self {
    PipelineMap { map }
  }

  pub fn insert(&mut self, pattern: impl Into<String>, plugins: Vec<PluginNode>) {
    self.map.insert(pattern.into(), plugins);
  }

  /// Returns the transformers for a path in configuration order, each with
  /// the key path of the configuration entry it came from.
  ///
  /// When a named pipeline is requested, a pattern carrying that pipeline
  /// must match or the result is empty; unnamed patterns then extend the
  /// match so type-generic transformers still apply.
  pub fn get(&self, path: &ProjectPath, pipeline: Option<&str>) -> Vec<(PluginNode, String)> {
    let path_str = path.to_string_lossy();
    let basename = path
      .as_path()
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    let mut matches = Vec::new();
    if let Some(pipeline) = pipeline {
      let named = self
        .map
        .iter()
        .find(|(pattern, _)| is_match(pattern, &path_str, &basename, Some(pipeline)));
      match named {
        Some(entry) => matches.push(entry),
        None => return Vec::new(),
      }
    }

    for entry in self.map.iter() {
      if is_match(entry.0, &path_str, &basename, None) {
        matches.push(entry);
      }
    }

    matches
      .into_iter()
      .flat_map(|(pattern, plugins)| {
        plugins.iter().enumerate().map(move |(index, plugin)| {
          (
            plugin.clone(),
            format!("transformers[\"{}\"][{}]", pattern, index),
          )
        })
      })
      .collect()
  }
}

fn is_match(pattern: &str, path: &str, basename: &str, pipeline: Option<&str>) -> bool {
  let (pattern_pipeline, glob) = match pattern.split_once(':') {
    Some((pipeline, glob)) => (Some(pipeline), glob),
    None => (None, pattern),
  };
  if pipeline != pattern_pipeline {
    return false;
  }
  glob_match(glob, basename) || glob_match(glob, path)
}

/// The resolved plugin configuration for a project: which transformers
/// apply to which paths, the loaded plugin handles, and the resolver that
/// pipelines delegate specifier resolution to.
pub struct ProjectConfig {
  /// Path of the configuration file, recorded as provenance on produced
  /// assets.
  pub file_path: ProjectPath,
  transformers: PipelineMap,
  plugins: HashMap<String, Arc<Transformer>>,
  loaded: DashMap<String, Arc<Transformer>>,
  resolver: ResolverRef,
}

impl ProjectConfig {
  pub fn new(file_path: ProjectPath, transformers: PipelineMap, resolver: ResolverRef) -> Self {
    ProjectConfig {
      file_path,
      transformers,
      plugins: HashMap::new(),
      loaded: DashMap::new(),
      resolver,
    }
  }

  pub fn register_plugin(&mut self, name: impl Into<String>, plugin: Transformer) {
    self.plugins.insert(name.into(), Arc::new(plugin));
  }

  pub fn transformers(
    &self,
    path: &ProjectPath,
    pipeline: Option<&str>,
    allow_empty: bool,
  ) -> Result<Vec<(PluginNode, String)>, Diagnostic> {
    let transformers = self.transformers.get(path, pipeline);
    if transformers.is_empty() && !allow_empty {
      let message = match pipeline {
        None => format!("No transformers found for {}.", path),
        Some(pipeline) => format!(
          "No transformers found for {} with pipeline {:?}.",
          path, pipeline
        ),
      };
      return Err(Diagnostic::new(message));
    }
    Ok(transformers)
  }

  pub fn load_plugin(&self, node: &PluginNode) -> anyhow::Result<Arc<Transformer>> {
    if let Some(loaded) = self.loaded.get(&node.package_name) {
      return Ok(loaded.value().clone());
    }
    let plugin = self
      .plugins
      .get(&node.package_name)
      .cloned()
      .ok_or_else(|| anyhow::anyhow!("Plugin {} is not registered", node.package_name))?;
    self
      .loaded
      .insert(node.package_name.clone(), plugin.clone());
    Ok(plugin)
  }

  /// Drops the cached handle for a plugin so the next load re-resolves it.
  pub fn invalidate_plugin(&self, specifier: &str) {
    self.loaded.remove(specifier);
  }

  pub fn resolver(&self) -> ResolverRef {
    self.resolver.clone()
  }
}
