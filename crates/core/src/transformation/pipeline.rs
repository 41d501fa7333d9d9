use std::sync::Arc;

use super::{Transformation, UncommittedAsset};
use crate::dev_dep::DevDepSpecifier;
use crate::diagnostic::{Diagnostic, DiagnosticResult};
use crate::plugin::{LoadConfigContext, PluginConfig, PluginLogger, PluginOptions, Transformer};
use crate::project_config::PluginNode;
use crate::project_path::ProjectPath;
use crate::resolver::ResolverRef;

/// Generates content for an asset from its AST using the most recent
/// transformer that produced one, then clears the AST.
pub(crate) type PipelineGenerate =
  Arc<dyn Fn(&mut UncommittedAsset, &PluginOptions) -> anyhow::Result<()> + Send + Sync>;

/// One resolved transformer within a pipeline.
#[derive(Clone)]
pub struct TransformerNode {
  pub name: String,
  pub resolve_from: ProjectPath,
  pub plugin: Arc<Transformer>,
  pub config: Option<Arc<PluginConfig>>,
  pub config_key_path: Option<String>,
}

/// The ordered transformers selected for one path, identified by the
/// `:`-joined transformer names. `generate` threads the latest AST
/// producer between transformer calls.
pub struct Pipeline {
  pub id: String,
  pub transformers: Vec<TransformerNode>,
  pub resolver: ResolverRef,
  pub(crate) generate: Option<PipelineGenerate>,
}

impl Transformation {
  /// Resolves the pipeline for a path, loading each transformer's plugin
  /// handle and configuration.
  pub(crate) fn load_pipeline(
    &mut self,
    file_path: &ProjectPath,
    is_source: bool,
    pipeline_name: Option<&str>,
    allow_empty: bool,
  ) -> DiagnosticResult<Pipeline> {
    let nodes = self
      .config
      .transformers(file_path, pipeline_name, allow_empty)
      .map_err(|diagnostic| vec![diagnostic.with_file_path(self.absolute_request_path())])?;

    let mut transformers = Vec::with_capacity(nodes.len());
    let mut names = Vec::with_capacity(nodes.len());
    for (node, config_key_path) in nodes {
      let plugin = self.config.load_plugin(&node).map_err(|err| {
        vec![Diagnostic::from_error(
          &err,
          Some(&node.package_name),
          Some(self.absolute_request_path()),
        )]
      })?;
      let config = self.load_plugin_config(&node, &plugin, is_source)?;
      if let Some(config) = &config {
        self.configs.insert(node.package_name.clone(), config.clone());
      }
      names.push(node.package_name.clone());
      transformers.push(TransformerNode {
        name: node.package_name,
        resolve_from: node.resolve_from,
        plugin,
        config,
        config_key_path: Some(config_key_path),
      });
    }

    Ok(Pipeline {
      id: names.join(":"),
      transformers,
      resolver: self.config.resolver(),
      generate: None,
    })
  }

  /// Runs a plugin's `load_config` and registers its declared dev
  /// dependencies, attributing any failure to the plugin.
  fn load_plugin_config(
    &mut self,
    node: &PluginNode,
    plugin: &Transformer,
    is_source: bool,
  ) -> DiagnosticResult<Option<Arc<PluginConfig>>> {
    let Some(load_config) = plugin.load_config.clone() else {
      return Ok(None);
    };

    let mut config = PluginConfig::new(
      &node.package_name,
      self.request.file_path.clone(),
      self.request.env.clone(),
      is_source,
    );
    let logger = PluginLogger::new(&node.package_name);
    load_config(LoadConfigContext {
      config: &mut config,
      options: &self.plugin_options,
      logger: &logger,
    })
    .map_err(|err| {
      vec![Diagnostic::from_error(
        &err,
        Some(&node.package_name),
        Some(self.absolute_request_path()),
      )]
    })?;

    let owner = DevDepSpecifier {
      specifier: node.package_name.clone(),
      resolve_from: node.resolve_from.clone(),
    };
    for dev_dep in config.dev_deps().to_vec() {
      self
        .add_dev_dependency(&dev_dep.specifier, &dev_dep.resolve_from, Some(owner.clone()))
        .map_err(|err| {
          vec![Diagnostic::from_error(
            &err,
            Some(&node.package_name),
            Some(self.absolute_request_path()),
          )]
        })?;
    }

    Ok(Some(Arc::new(config)))
  }

  /// Resolves the pipeline a type-changed asset would chain into.
  ///
  /// Returns `None` when the hypothetical path resolves back to the same
  /// pipeline identity, which marks the asset as terminal and is what
  /// prevents chaining from looping.
  pub(crate) fn load_next_pipeline(
    &mut self,
    current_id: &str,
    initial_file_path: &ProjectPath,
    asset: &UncommittedAsset,
  ) -> DiagnosticResult<Option<Pipeline>> {
    let next_path = initial_file_path.with_extension(asset.value.file_type.extension());
    let next = self.load_pipeline(
      &next_path,
      asset.value.is_source(),
      asset.value.pipeline.as_deref(),
      true,
    )?;
    if next.id == current_id {
      Ok(None)
    } else {
      Ok(Some(next))
    }
  }
}
