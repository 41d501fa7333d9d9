use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::invalidation::{file_create_to_project, FileCreateInvalidation};
use crate::project_path::ProjectPath;
use crate::transformation::UncommittedAsset;
use crate::types::{Ast, BundleBehavior, Dependency, FileType, JSONObject, Symbol};

/// The mutable view of an asset handed to transformer plugins.
///
/// The facade keeps plugins away from the internal asset record: reads are
/// mediated, writes keep derived state (asset id, AST dirtiness) coherent,
/// and invalidation calls convert the plugin's absolute paths into
/// project-relative records. Nothing here survives past the transformer
/// call, so plugins cannot hold onto the asset after the transformation
/// ends.
pub struct MutableAsset<'a> {
  asset: &'a mut UncommittedAsset,
}

impl<'a> MutableAsset<'a> {
  pub(crate) fn new(asset: &'a mut UncommittedAsset) -> Self {
    MutableAsset { asset }
  }

  pub fn id(&self) -> &str {
    &self.asset.value.id
  }

  pub fn file_path(&self) -> &ProjectPath {
    &self.asset.value.file_path
  }

  pub fn file_type(&self) -> &FileType {
    &self.asset.value.file_type
  }

  pub fn set_file_type(&mut self, file_type: FileType) {
    if self.asset.value.file_type != file_type {
      self.asset.value.file_type = file_type;
      self.asset.refresh_id();
    }
  }

  pub fn env(&self) -> &Arc<Environment> {
    &self.asset.value.env
  }

  pub fn query(&self) -> Option<&IndexMap<String, String>> {
    self.asset.value.query.as_ref()
  }

  pub fn pipeline(&self) -> Option<&str> {
    self.asset.value.pipeline.as_deref()
  }

  pub fn is_source(&self) -> bool {
    self.asset.value.is_source()
  }

  pub fn side_effects(&self) -> bool {
    self.asset.value.side_effects()
  }

  pub fn bundle_behavior(&self) -> BundleBehavior {
    self.asset.value.bundle_behavior
  }

  pub fn set_bundle_behavior(&mut self, bundle_behavior: BundleBehavior) {
    self.asset.value.bundle_behavior = bundle_behavior;
  }

  pub fn unique_key(&self) -> Option<&str> {
    self.asset.value.unique_key.as_deref()
  }

  pub fn meta_mut(&mut self) -> &mut JSONObject {
    &mut self.asset.value.meta
  }

  pub fn symbols(&self) -> &[Symbol] {
    &self.asset.value.symbols
  }

  pub fn set_symbols(&mut self, symbols: Vec<Symbol>) {
    self.asset.value.symbols = symbols;
  }

  /// The current content of the asset. Fails if the AST has diverged from
  /// the content; a transformer that needs bytes after mutating the AST
  /// must wait for generation.
  pub fn content(&self) -> anyhow::Result<&[u8]> {
    if self.asset.ast.is_some() && self.asset.is_ast_dirty {
      anyhow::bail!("Cannot read the content of an asset with a dirty AST");
    }
    Ok(self.asset.content.as_deref().unwrap_or(&[]))
  }

  /// Replaces the content, discarding any AST derived from the previous
  /// content.
  pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
    self.asset.content = Some(content.into());
    self.asset.clear_ast();
  }

  pub fn map_buffer(&self) -> Option<&[u8]> {
    self.asset.map_buffer.as_deref()
  }

  pub fn set_map_buffer(&mut self, map: Vec<u8>) {
    self.asset.map_buffer = Some(map);
  }

  pub fn ast(&self) -> Option<&Ast> {
    self.asset.ast.as_deref()
  }

  /// Attaches an AST that is newer than the current content.
  pub fn set_ast(&mut self, ast: Ast) {
    self.asset.ast = Some(Arc::new(ast));
    self.asset.is_ast_dirty = true;
  }

  /// Records a dependency and returns its id.
  pub fn add_dependency(&mut self, dependency: Dependency) -> String {
    self.asset.add_dependency(dependency)
  }

  /// Marks a file (absolute path) as an input of this transformation.
  pub fn invalidate_on_file_change(&mut self, file_path: &Path) {
    let project_root = self.asset.options.project_root.clone();
    self
      .asset
      .invalidations
      .lock()
      .invalidate_on_file_change(ProjectPath::from_absolute(&project_root, file_path));
  }

  /// Requests a re-run if a matching file is created. Paths inside the
  /// invalidation are absolute.
  pub fn invalidate_on_file_create(&mut self, invalidation: FileCreateInvalidation) {
    let project_root = self.asset.options.project_root.clone();
    self
      .asset
      .invalidations
      .lock()
      .invalidate_on_file_create(file_create_to_project(&project_root, invalidation));
  }
}
