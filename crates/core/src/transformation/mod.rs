mod pipeline;
mod runner;
mod uncommitted_asset;

pub use pipeline::{Pipeline, TransformerNode};
pub use uncommitted_asset::UncommittedAsset;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use data_encoding::BASE64;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dev_dep::{dev_dep_key, DevDepRequest, DevDepSpecifier};
use crate::diagnostic::{Diagnostic, DiagnosticResult};
use crate::environment::Environment;
use crate::hash::hash_bytes;
use crate::invalidation::{
  file_create_to_project, get_invalidation_hash, FileCreateInvalidation, InvalidateReason,
  Invalidations, RequestInvalidation, SharedInvalidations,
};
use crate::options::BuildOptions;
use crate::plugin::{ConfigRequest, PluginConfig, PluginOptions};
use crate::project_config::ProjectConfig;
use crate::project_path::ProjectPath;
use crate::reporter::{BuildPhase, Reporter, ReporterEvent, ReporterRef};
use crate::types::{Asset, AssetFlags, AssetStats, BundleBehavior, FileType, JSONObject};

/// The serializable description of one unit of transformation work,
/// dispatched to a worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRequest {
  pub file_path: ProjectPath,
  /// Inline code to transform instead of reading `file_path`.
  #[serde(default, with = "serde_bytes")]
  pub code: Option<Vec<u8>>,
  pub env: Arc<Environment>,
  #[serde(default)]
  pub pipeline: Option<String>,
  /// Overrides the default judgment of whether the input is user code.
  #[serde(default)]
  pub is_source: Option<bool>,
  #[serde(default)]
  pub side_effects: Option<bool>,
  #[serde(default)]
  pub query: Option<IndexMap<String, String>>,
  /// Dev-dep hashes already known to the upstream graph, keyed by
  /// `specifier:resolveFrom`.
  #[serde(default)]
  pub dev_deps: HashMap<String, String>,
  /// Dev deps whose cached resolutions must be dropped before running.
  #[serde(default)]
  pub invalidated_dev_deps: Vec<DevDepSpecifier>,
  /// Why the upstream graph re-dispatched this work.
  #[serde(default)]
  pub invalidate_reason: InvalidateReason,
  /// Invalidations already attributed to this request, hashed into the
  /// initial cache key.
  #[serde(default)]
  pub invalidations: Vec<RequestInvalidation>,
}

/// Everything a transformation produced: output assets plus the records
/// the upstream graph needs to invalidate and re-dispatch the work.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
  pub assets: Vec<Asset>,
  pub config_requests: Vec<ConfigRequest>,
  pub invalidations: Vec<RequestInvalidation>,
  pub invalidate_on_file_create: Vec<FileCreateInvalidation>,
  pub dev_dep_requests: Vec<DevDepRequest>,
}

/// One unit of transformation work: loads a source, runs it through the
/// transformer pipelines its type resolves to, and accounts for every
/// input that could change the output.
pub struct Transformation {
  pub(crate) request: TransformationRequest,
  pub(crate) options: Arc<BuildOptions>,
  pub(crate) config: Arc<ProjectConfig>,
  reporter: ReporterRef,
  pub(crate) plugin_options: PluginOptions,
  pub(crate) invalidations: SharedInvalidations,
  pub(crate) configs: IndexMap<String, Arc<PluginConfig>>,
  pub(crate) dev_dep_requests: IndexMap<String, DevDepRequest>,
}

impl Transformation {
  pub fn new(
    request: TransformationRequest,
    options: Arc<BuildOptions>,
    config: Arc<ProjectConfig>,
    reporter: ReporterRef,
  ) -> Self {
    let invalidations: SharedInvalidations = Arc::new(Mutex::new(Invalidations::default()));
    let plugin_options = PluginOptions::new(options.clone(), invalidations.clone());
    Transformation {
      request,
      options,
      config,
      reporter,
      plugin_options,
      invalidations,
      configs: IndexMap::new(),
      dev_dep_requests: IndexMap::new(),
    }
  }

  pub fn run(mut self) -> DiagnosticResult<TransformationResult> {
    self.report(ReporterEvent::BuildProgress {
      phase: BuildPhase::Transforming,
      file_path: self.absolute_request_path(),
    });

    let mut asset = self.load_asset()?;

    if asset.value.file_type.supports_source_maps() {
      // A broken source map degrades debugging, not the build.
      if let Err(err) = self.load_existing_source_map(&mut asset) {
        tracing::debug!(
          "failed to load existing source map for {}: {}",
          asset.value.file_path,
          err
        );
      }
    }

    self.drop_invalidated_plugins();

    let file_path = asset.value.file_path.clone();
    let is_source = asset.value.is_source();
    let pipeline_name = self.request.pipeline.clone();
    let pipeline = self.load_pipeline(&file_path, is_source, pipeline_name.as_deref(), false)?;
    let assets = self.run_pipelines(pipeline, asset)?;
    let assets: Vec<Asset> = assets
      .into_iter()
      .map(UncommittedAsset::into_value)
      .collect();

    let config_requests: Vec<ConfigRequest> = self
      .configs
      .values()
      .filter(|config| !config.is_empty())
      .map(|config| ConfigRequest::from(config.as_ref()))
      .collect();

    let dev_dep_requests = self.flush_dev_dep_requests();

    let (invalidations, invalidate_on_file_create) = {
      let tracker = self.invalidations.lock();
      (tracker.invalidations(), tracker.file_create_invalidations())
    };

    Ok(TransformationResult {
      assets,
      config_requests,
      invalidations,
      invalidate_on_file_create,
      dev_dep_requests,
    })
  }

  /// Reads the source (inline code or the input filesystem) and builds the
  /// initial asset.
  fn load_asset(&mut self) -> DiagnosticResult<UncommittedAsset> {
    let request = &self.request;
    let (content, hash) = match &request.code {
      Some(code) => (code.clone(), hash_bytes(code)),
      None => {
        let absolute = request.file_path.to_absolute(&self.options.project_root);
        // The source file itself is watched by the upstream graph node
        // that dispatched this request, so it is not recorded here.
        let content = self.options.input_fs.read(&absolute).map_err(|err| {
          vec![
            Diagnostic::new(format!("Failed to read {}: {}", absolute.display(), err))
              .with_file_path(absolute.clone()),
          ]
        })?;
        let hash = hash_bytes(&content);
        (content, hash)
      }
    };

    let is_source_default = !request
      .file_path
      .as_path()
      .components()
      .any(|component| component.as_os_str() == "node_modules");
    let mut flags = AssetFlags::IS_BUNDLE_SPLITTABLE;
    flags.set(
      AssetFlags::IS_SOURCE,
      request.is_source.unwrap_or(is_source_default),
    );
    flags.set(
      AssetFlags::SIDE_EFFECTS,
      request.side_effects.unwrap_or(true),
    );

    let id_base = if request.code.is_some() {
      hash.clone()
    } else {
      request.file_path.to_string_lossy()
    };

    let value = Asset {
      id: String::new(),
      file_path: request.file_path.clone(),
      file_type: FileType::from_extension(request.file_path.extension().unwrap_or("")),
      env: request.env.clone(),
      query: request.query.clone(),
      pipeline: request.pipeline.clone(),
      flags,
      bundle_behavior: BundleBehavior::None,
      hash: Some(hash),
      output_hash: None,
      content_key: None,
      map_key: None,
      ast_key: None,
      content: None,
      map: None,
      ast: None,
      is_ast_dirty: false,
      unique_key: None,
      stats: AssetStats::default(),
      symbols: Vec::new(),
      dependencies: Vec::new(),
      meta: JSONObject::new(),
      plugin: None,
      config_path: None,
      config_key_path: None,
    };

    Ok(UncommittedAsset::new(
      value,
      Some(content),
      id_base,
      self.options.clone(),
      self.invalidations.clone(),
    ))
  }

  /// Picks up a `sourceMappingURL` reference left by an earlier compile
  /// step, either inline (base64 data URL) or as a sibling file.
  fn load_existing_source_map(&self, asset: &mut UncommittedAsset) -> anyhow::Result<()> {
    let Some(content) = asset.content.as_deref() else {
      return Ok(());
    };
    let Some(url) = find_source_map_url(content) else {
      return Ok(());
    };

    if let Some(data) = url.strip_prefix("data:") {
      let Some((_, payload)) = data.split_once("base64,") else {
        anyhow::bail!("unsupported inline source map encoding");
      };
      asset.map_buffer = Some(BASE64.decode(payload.trim().as_bytes())?);
      return Ok(());
    }

    let absolute = asset
      .value
      .file_path
      .to_absolute(&self.options.project_root);
    let map_path = absolute.parent().unwrap_or_else(|| Path::new("")).join(&url);
    let map = self.options.input_fs.read(&map_path)?;
    self
      .invalidations
      .lock()
      .invalidate_on_file_change(ProjectPath::from_absolute(
        &self.options.project_root,
        &map_path,
      ));
    asset.map_buffer = Some(map);
    Ok(())
  }

  /// Drops cached plugin and package resolutions for dev deps the request
  /// marked invalidated, once per dependency per build.
  fn drop_invalidated_plugins(&self) {
    for dev_dep in &self.request.invalidated_dev_deps {
      if self
        .options
        .build_scope
        .invalidated_plugins
        .insert(dev_dep.key())
      {
        self.config.invalidate_plugin(&dev_dep.specifier);
        let from = dev_dep.resolve_from.to_absolute(&self.options.project_root);
        self
          .options
          .package_manager
          .invalidate(&dev_dep.specifier, &from);
      }
    }
  }

  /// Records a build-time dependency and the invalidations that would
  /// change it. A hash supplied with the request short-circuits the
  /// package manager entirely: the upstream graph will not re-run work
  /// for a dependency it knows is unchanged.
  pub(crate) fn add_dev_dependency(
    &mut self,
    specifier: &str,
    resolve_from: &ProjectPath,
    owner: Option<DevDepSpecifier>,
  ) -> anyhow::Result<()> {
    let key = dev_dep_key(specifier, resolve_from);
    if self.dev_dep_requests.contains_key(&key) {
      return Ok(());
    }

    if let Some(hash) = self.request.dev_deps.get(&key) {
      self.dev_dep_requests.insert(
        key,
        DevDepRequest::stripped(specifier.to_string(), resolve_from.clone(), hash.clone()),
      );
      return Ok(());
    }

    let from = resolve_from.to_absolute(&self.options.project_root);
    // Resolving first lets the package manager populate its invalidation
    // sets before they are queried.
    self.options.package_manager.resolve(specifier, &from)?;
    let package_invalidations = self
      .options
      .package_manager
      .get_invalidations(specifier, &from);

    let invalidate_on_file_change: BTreeSet<ProjectPath> = package_invalidations
      .invalidate_on_file_change
      .iter()
      .map(|path| ProjectPath::from_absolute(&self.options.project_root, path))
      .collect();
    let file_invalidations: Vec<RequestInvalidation> = invalidate_on_file_change
      .iter()
      .cloned()
      .map(|file_path| RequestInvalidation::File { file_path })
      .collect();
    let hash = get_invalidation_hash(&file_invalidations, &self.options);

    let invalidate_on_file_create = package_invalidations
      .invalidate_on_file_create
      .into_iter()
      .map(|invalidation| file_create_to_project(&self.options.project_root, invalidation))
      .collect();

    self.dev_dep_requests.insert(
      key,
      DevDepRequest {
        specifier: specifier.to_string(),
        resolve_from: resolve_from.clone(),
        hash,
        invalidate_on_file_change,
        invalidate_on_file_create,
        additional_invalidations: owner.into_iter().collect(),
      },
    );
    Ok(())
  }

  /// Emits the accumulated dev-dep requests, stripping payloads the
  /// build-scoped plugin cache shows were already sent with this hash.
  fn flush_dev_dep_requests(&mut self) -> Vec<DevDepRequest> {
    let scope = &self.options.build_scope;
    self
      .dev_dep_requests
      .values()
      .map(|request| {
        let cached = scope
          .plugin_cache
          .get(&request.specifier)
          .map(|entry| entry.value().clone());
        if cached.as_deref() == Some(request.hash.as_str()) {
          DevDepRequest::stripped(
            request.specifier.clone(),
            request.resolve_from.clone(),
            request.hash.clone(),
          )
        } else {
          scope
            .plugin_cache
            .insert(request.specifier.clone(), request.hash.clone());
          request.clone()
        }
      })
      .collect()
  }

  fn report(&self, event: ReporterEvent) {
    if let Err(err) = self.reporter.report(&event) {
      tracing::error!("reporter failed: {}", err);
    }
  }

  pub(crate) fn absolute_path(&self, path: &ProjectPath) -> PathBuf {
    path.to_absolute(&self.options.project_root)
  }

  pub(crate) fn absolute_request_path(&self) -> PathBuf {
    self.absolute_path(&self.request.file_path)
  }
}

fn find_source_map_url(content: &[u8]) -> Option<String> {
  // Only the tail can carry the reference comment.
  let tail = &content[content.len().saturating_sub(4096)..];
  let text = std::str::from_utf8(tail).ok()?;
  let index = text.rfind("sourceMappingURL=")?;
  let url = text[index + "sourceMappingURL=".len()..]
    .split(|c: char| c.is_whitespace() || c == '*')
    .next()?
    .trim();
  if url.is_empty() {
    None
  } else {
    Some(url.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_source_map_references() {
    let content = b"body {}\n/*# sourceMappingURL=app.css.map */\n";
    assert_eq!(
      find_source_map_url(content),
      Some("app.css.map".to_string())
    );
    assert_eq!(find_source_map_url(b"body {}"), None);
  }
}
