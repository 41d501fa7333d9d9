use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use super::{MutableAsset, PluginConfig, PluginLogger, PluginOptions};
use crate::environment::Environment;
use crate::project_path::ProjectPath;
use crate::types::{Asset, Ast, BundleBehavior, Dependency, FileType, JSONObject, Symbol};

/// A function that enables transformers to resolve a dependency specifier.
/// Takes the absolute path of the importing file and the specifier, and
/// returns the absolute path of the resolved file. Resolution side effects
/// (file and glob invalidations) are recorded by the core.
pub type Resolve = dyn Fn(&Path, &str) -> anyhow::Result<PathBuf> + Send + Sync;

pub struct LoadConfigContext<'a> {
  pub config: &'a mut PluginConfig,
  pub options: &'a PluginOptions,
  pub logger: &'a PluginLogger,
}

pub struct CanReuseAstContext<'a> {
  pub ast: &'a Ast,
  pub options: &'a PluginOptions,
  pub logger: &'a PluginLogger,
}

pub struct ParseContext<'a> {
  pub asset: MutableAsset<'a>,
  pub config: Option<&'a PluginConfig>,
  pub options: &'a PluginOptions,
  pub resolve: &'a Resolve,
  pub logger: &'a PluginLogger,
}

pub struct TransformContext<'a> {
  pub asset: MutableAsset<'a>,
  pub config: Option<&'a PluginConfig>,
  pub options: &'a PluginOptions,
  pub resolve: &'a Resolve,
  pub logger: &'a PluginLogger,
}

pub struct GenerateContext<'a> {
  pub asset: &'a Asset,
  pub ast: &'a Ast,
  pub options: &'a PluginOptions,
  pub logger: &'a PluginLogger,
}

/// Content produced from an AST.
#[derive(Clone, Debug)]
pub struct GeneratedOutput {
  pub content: Vec<u8>,
  pub map: Option<Vec<u8>>,
}

/// One output of a transformer.
#[derive(Clone, Debug)]
pub enum TransformerOutput {
  /// The input asset, as (possibly) mutated through the facade.
  Asset,
  /// A raw record describing an emitted asset.
  Result(RawAsset),
}

/// A plugin-facing asset record, as returned from `transform`.
///
/// Unset fields are inherited from the input asset. `dependencies` carry
/// absolute `resolve_from` paths and no internal identity fields; both are
/// reinstated when the record becomes an asset. An AST equal (by handle) to
/// the input asset's AST keeps its dirty state, any other AST is treated as
/// newer than the content.
#[derive(Clone, Debug, Default)]
pub struct RawAsset {
  pub file_type: Option<FileType>,
  pub content: Option<Vec<u8>>,
  pub map: Option<Vec<u8>>,
  pub ast: Option<Arc<Ast>>,
  pub dependencies: Vec<Dependency>,
  pub env: Option<Arc<Environment>>,
  pub file_path: Option<ProjectPath>,
  pub bundle_behavior: Option<BundleBehavior>,
  pub side_effects: Option<bool>,
  pub is_bundle_splittable: Option<bool>,
  pub meta: JSONObject,
  pub pipeline: Option<String>,
  pub symbols: Option<Vec<Symbol>>,
  pub unique_key: Option<String>,
  pub query: Option<IndexMap<String, String>>,
}

pub type LoadConfigFn = Arc<dyn Fn(LoadConfigContext) -> anyhow::Result<()> + Send + Sync>;
pub type CanReuseAstFn = Arc<dyn Fn(CanReuseAstContext) -> bool + Send + Sync>;
pub type ParseFn = Arc<dyn Fn(ParseContext) -> anyhow::Result<Option<Ast>> + Send + Sync>;
pub type TransformFn =
  Arc<dyn Fn(TransformContext) -> anyhow::Result<Vec<TransformerOutput>> + Send + Sync>;
pub type GenerateFn = Arc<dyn Fn(GenerateContext) -> anyhow::Result<GeneratedOutput> + Send + Sync>;

/// A transformer plugin: a record of optional operation handles. The core
/// never inspects a plugin beyond which operations it exposes.
///
/// A transformer without `transform` passes assets through unchanged, which
/// is useful for plugins that only parse or only load configuration.
#[derive(Clone, Default)]
pub struct Transformer {
  pub load_config: Option<LoadConfigFn>,
  pub can_reuse_ast: Option<CanReuseAstFn>,
  pub parse: Option<ParseFn>,
  pub transform: Option<TransformFn>,
  pub generate: Option<GenerateFn>,
}
