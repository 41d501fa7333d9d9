use std::sync::Arc;

use crate::hash::{hash_bytes, hash_string};
use crate::invalidation::SharedInvalidations;
use crate::options::BuildOptions;
use crate::plugin::RawAsset;
use crate::project_path::ProjectPath;
use crate::types::{create_asset_id, Asset, AssetStats, Ast, Dependency};
use crate::SKEIN_VERSION;

/// A mutable asset under construction within one transformation.
///
/// Content, source map, and AST live beside the value record until the
/// asset is committed to the cache or handed back to the caller. Every
/// asset shares the invalidation trackers of its transformation.
pub struct UncommittedAsset {
  pub(crate) value: Asset,
  pub(crate) content: Option<Vec<u8>>,
  pub(crate) map_buffer: Option<Vec<u8>>,
  pub(crate) ast: Option<Arc<Ast>>,
  pub(crate) is_ast_dirty: bool,
  /// Stable identity of the initial source within one build: the content
  /// hash for inline code, the relative path otherwise.
  pub(crate) id_base: String,
  pub(crate) options: Arc<BuildOptions>,
  pub(crate) invalidations: SharedInvalidations,
}

impl UncommittedAsset {
  pub(crate) fn new(
    mut value: Asset,
    content: Option<Vec<u8>>,
    id_base: String,
    options: Arc<BuildOptions>,
    invalidations: SharedInvalidations,
  ) -> Self {
    value.id = create_asset_id(
      &id_base,
      &value.file_type,
      &value.env,
      value.pipeline.as_deref(),
      value.query.as_ref(),
      value.unique_key.as_deref(),
    );
    UncommittedAsset {
      value,
      content,
      map_buffer: None,
      ast: None,
      is_ast_dirty: false,
      id_base,
      options,
      invalidations,
    }
  }

  /// Rebuilds an asset from a cached value record and its blobs.
  pub(crate) fn from_cached(
    value: Asset,
    content: Option<Vec<u8>>,
    map_buffer: Option<Vec<u8>>,
    ast: Option<Ast>,
    id_base: String,
    options: Arc<BuildOptions>,
    invalidations: SharedInvalidations,
  ) -> Self {
    let is_ast_dirty = value.is_ast_dirty;
    UncommittedAsset {
      value,
      content,
      map_buffer,
      ast: ast.map(Arc::new),
      is_ast_dirty,
      id_base,
      options,
      invalidations,
    }
  }

  /// Recomputes the asset id after an identity-bearing field changed.
  pub(crate) fn refresh_id(&mut self) {
    self.value.id = create_asset_id(
      &self.id_base,
      &self.value.file_type,
      &self.value.env,
      self.value.pipeline.as_deref(),
      self.value.query.as_ref(),
      self.value.unique_key.as_deref(),
    );
  }

  /// Attaches a parsed AST that still matches the content.
  pub(crate) fn attach_ast(&mut self, ast: Ast) {
    self.ast = Some(Arc::new(ast));
    self.is_ast_dirty = false;
  }

  pub(crate) fn clear_ast(&mut self) {
    self.ast = None;
    self.is_ast_dirty = false;
  }

  /// Internalizes and records a dependency, returning its id.
  pub(crate) fn add_dependency(&mut self, mut dependency: Dependency) -> String {
    if dependency.env.is_none() {
      dependency.env = Some(self.value.env.clone());
    }
    if let Some(resolve_from) = dependency.resolve_from.take() {
      dependency.resolve_from = Some(ProjectPath::from_absolute(
        &self.options.project_root,
        resolve_from.as_path(),
      ));
    }
    dependency.source_asset_id = Some(self.value.id.clone());
    dependency.source_path = Some(self.value.file_path.clone());
    let id = dependency.compute_id();
    dependency.id = Some(id.clone());
    if !self
      .value
      .dependencies
      .iter()
      .any(|existing| existing.id.as_deref() == Some(id.as_str()))
    {
      self.value.dependencies.push(dependency);
    }
    id
  }

  /// Converts the asset into the plugin-facing result record: internal
  /// dependency fields are stripped and `resolve_from` paths become
  /// absolute again.
  pub(crate) fn as_raw_result(&self) -> RawAsset {
    let project_root = &self.options.project_root;
    let dependencies = self
      .value
      .dependencies
      .iter()
      .map(|dependency| {
        let mut dependency = dependency.clone();
        dependency.id = None;
        dependency.source_asset_id = None;
        dependency.source_path = None;
        if let Some(resolve_from) = dependency.resolve_from.take() {
          dependency.resolve_from = Some(resolve_from.to_absolute(project_root).into());
        }
        dependency
      })
      .collect();

    RawAsset {
      file_type: Some(self.value.file_type.clone()),
      content: self.content.clone(),
      map: self.map_buffer.clone(),
      ast: self.ast.clone(),
      dependencies,
      env: Some(self.value.env.clone()),
      file_path: Some(self.value.file_path.clone()),
      bundle_behavior: Some(self.value.bundle_behavior),
      side_effects: Some(self.value.side_effects()),
      is_bundle_splittable: Some(
        self
          .value
          .flags
          .contains(crate::types::AssetFlags::IS_BUNDLE_SPLITTABLE),
      ),
      meta: self.value.meta.clone(),
      pipeline: self.value.pipeline.clone(),
      symbols: Some(self.value.symbols.clone()),
      unique_key: self.value.unique_key.clone(),
      query: self.value.query.clone(),
    }
  }

  /// Builds the asset a transformer result describes, preserving
  /// provenance and sharing this asset's id base and trackers.
  pub(crate) fn create_child_asset(
    &self,
    result: RawAsset,
    plugin_name: &str,
    config_path: ProjectPath,
    config_key_path: Option<String>,
  ) -> UncommittedAsset {
    use crate::types::AssetFlags;

    let mut flags = AssetFlags::empty();
    flags.set(AssetFlags::IS_SOURCE, self.value.is_source());
    flags.set(
      AssetFlags::SIDE_EFFECTS,
      result.side_effects.unwrap_or(self.value.side_effects()),
    );
    flags.set(
      AssetFlags::IS_BUNDLE_SPLITTABLE,
      result
        .is_bundle_splittable
        .unwrap_or_else(|| self.value.flags.contains(AssetFlags::IS_BUNDLE_SPLITTABLE)),
    );

    let mut meta = self.value.meta.clone();
    meta.extend(result.meta);

    let value = Asset {
      id: String::new(),
      file_path: result
        .file_path
        .unwrap_or_else(|| self.value.file_path.clone()),
      file_type: result
        .file_type
        .unwrap_or_else(|| self.value.file_type.clone()),
      env: result.env.unwrap_or_else(|| self.value.env.clone()),
      query: result.query.or_else(|| self.value.query.clone()),
      pipeline: result.pipeline.or_else(|| self.value.pipeline.clone()),
      flags,
      bundle_behavior: result.bundle_behavior.unwrap_or(self.value.bundle_behavior),
      hash: self.value.hash.clone(),
      output_hash: None,
      content_key: None,
      map_key: None,
      ast_key: None,
      content: None,
      map: None,
      ast: None,
      is_ast_dirty: false,
      unique_key: result.unique_key,
      stats: AssetStats::default(),
      symbols: result
        .symbols
        .unwrap_or_else(|| self.value.symbols.clone()),
      dependencies: Vec::new(),
      meta,
      plugin: Some(plugin_name.to_string()),
      config_path: Some(config_path),
      config_key_path,
    };

    // An AST shared with this asset keeps its dirty state; a transformer
    // supplied AST is newer than whatever content came with it.
    let is_ast_dirty = match (&result.ast, &self.ast) {
      (Some(ast), Some(own)) if Arc::ptr_eq(ast, own) => self.is_ast_dirty,
      (Some(_), _) => true,
      (None, _) => false,
    };

    let mut child = UncommittedAsset::new(
      value,
      result.content,
      self.id_base.clone(),
      self.options.clone(),
      self.invalidations.clone(),
    );
    child.map_buffer = result.map;
    child.ast = result.ast;
    child.is_ast_dirty = is_ast_dirty;
    for dependency in result.dependencies {
      child.add_dependency(dependency);
    }
    child
  }

  /// Stores content, map, and AST blobs in the cache and records their
  /// keys on the value.
  pub(crate) fn commit(&mut self) -> anyhow::Result<()> {
    self.finalize_stats();
    let cache = &self.options.cache;

    let content = self.content.clone().unwrap_or_default();
    let content_key = hash_string(&format!("{}:{}:content", SKEIN_VERSION, self.value.id));
    cache.set_blob(&content_key, content)?;
    self.value.content_key = Some(content_key);

    if let Some(map) = &self.map_buffer {
      let map_key = hash_string(&format!("{}:{}:map", SKEIN_VERSION, self.value.id));
      cache.set_blob(&map_key, map.clone())?;
      self.value.map_key = Some(map_key);
    }

    if let Some(ast) = &self.ast {
      let ast_key = hash_string(&format!("{}:{}:ast", SKEIN_VERSION, self.value.id));
      cache.set_blob(&ast_key, bincode::serialize(ast.as_ref())?)?;
      self.value.ast_key = Some(ast_key);
    }

    Ok(())
  }

  /// Finalizes the value record for the caller. Uncommitted assets carry
  /// their content, map, and AST inline.
  pub(crate) fn into_value(mut self) -> Asset {
    self.finalize_stats();
    if self.value.content_key.is_none() {
      self.value.content = self.content.take();
      self.value.map = self.map_buffer.take();
      self.value.ast = self.ast.take().map(|ast| (*ast).clone());
    }
    self.value
  }

  fn finalize_stats(&mut self) {
    let content = self.content.as_deref().unwrap_or(&[]);
    self.value.output_hash = Some(hash_bytes(content));
    self.value.stats = AssetStats {
      size: content.len() as u32,
      time: 0,
    };
    self.value.is_ast_dirty = self.is_ast_dirty;
  }
}
