use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use super::pipeline::{Pipeline, TransformerNode};
use super::{Transformation, UncommittedAsset};
use crate::dev_dep::dev_dep_key;
use crate::diagnostic::{Diagnostic, DiagnosticResult};
use crate::environment::{BuildMode, Environment};
use crate::hash::hash_object;
use crate::invalidation::{get_invalidation_hash, InvalidateReason, RequestInvalidation};
use crate::plugin::{
  CanReuseAstContext, GenerateContext, MutableAsset, ParseContext, PluginLogger, PluginOptions,
  RawAsset, Resolve, TransformContext, TransformerOutput,
};
use crate::project_path::ProjectPath;
use crate::resolver::ResolverRef;
use crate::types::{Asset, FileType};
use crate::SKEIN_VERSION;

/// The serialized form of one asset in a cached transformation result.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedAsset {
  id_base: String,
  value: Asset,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheKeyInput<'a> {
  bundler_version: &'static str,
  assets: Vec<AssetSnapshot<'a>>,
  env: &'a Environment,
  invalidation_hash: &'a str,
  pipeline_hash: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetSnapshot<'a> {
  file_path: &'a ProjectPath,
  pipeline: Option<&'a str>,
  hash: Option<&'a str>,
  unique_key: Option<&'a str>,
  query: Vec<(&'a str, &'a str)>,
}

impl Transformation {
  /// Runs a pipeline with caching, then chains type-changed outputs into
  /// their next pipelines, splicing chained results in place.
  pub(crate) fn run_pipelines(
    &mut self,
    mut pipeline: Pipeline,
    initial_asset: UncommittedAsset,
  ) -> DiagnosticResult<Vec<UncommittedAsset>> {
    let initial_type = initial_asset.value.file_type.clone();
    let initial_file_path = initial_asset.value.file_path.clone();

    let pipeline_hash = self.get_pipeline_hash(&pipeline)?;
    let request_invalidation_hash =
      get_invalidation_hash(&self.request.invalidations, &self.options);
    let cache_key = self.get_cache_key(
      &[&initial_asset],
      &request_invalidation_hash,
      &pipeline_hash,
    );

    let cached = self.read_from_cache(&cache_key).map_err(|err| {
      vec![Diagnostic::from_error(
        &err,
        None,
        Some(self.absolute_path(&initial_file_path)),
      )]
    })?;
    let was_cached = cached.is_some();
    let mut assets = match cached {
      Some(assets) => assets,
      None => self.run_pipeline(&mut pipeline, initial_asset)?,
    };

    for node in &pipeline.transformers {
      self
        .add_dev_dependency(&node.name, &node.resolve_from, None)
        .map_err(|err| {
          vec![Diagnostic::from_error(
            &err,
            Some(&node.name),
            Some(self.absolute_path(&initial_file_path)),
          )]
        })?;
    }

    if !was_cached {
      // The write-back key hashes everything the produced assets read,
      // not just the request-level invalidations the lookup key used.
      let observed = self.invalidations.lock().invalidations();
      let result_invalidation_hash = get_invalidation_hash(&observed, &self.options);
      let asset_refs: Vec<&UncommittedAsset> = assets.iter().collect();
      let result_key = self.get_cache_key(&asset_refs, &result_invalidation_hash, &pipeline_hash);
      self.write_to_cache(&result_key, &mut assets).map_err(|err| {
        vec![Diagnostic::from_error(
          &err,
          None,
          Some(self.absolute_path(&initial_file_path)),
        )]
      })?;
    }

    let mut final_assets = Vec::new();
    for asset in assets {
      if asset.value.file_type != initial_type {
        if let Some(next) = self.load_next_pipeline(&pipeline.id, &initial_file_path, &asset)? {
          final_assets.extend(self.run_pipelines(next, asset)?);
          continue;
        }
      }
      final_assets.push(asset);
    }
    Ok(final_assets)
  }

  /// Drives one pipeline over an asset sequence.
  ///
  /// Assets whose type diverged from the initial type and that would chain
  /// into a different pipeline are set aside for the caller instead of
  /// being fed to the remaining transformers.
  fn run_pipeline(
    &mut self,
    pipeline: &mut Pipeline,
    initial_asset: UncommittedAsset,
  ) -> DiagnosticResult<Vec<UncommittedAsset>> {
    if pipeline.transformers.is_empty() {
      return Ok(vec![initial_asset]);
    }

    let initial_type = initial_asset.value.file_type.clone();
    let initial_file_path = initial_asset.value.file_path.clone();
    let absolute_path = self.absolute_path(&initial_file_path);
    let pipeline_id = pipeline.id.clone();

    let mut input_assets = vec![initial_asset];
    let mut final_assets = Vec::new();
    for index in 0..pipeline.transformers.len() {
      let node = pipeline.transformers[index].clone();
      let mut resulting_assets = Vec::new();
      for mut asset in input_assets {
        if asset.value.file_type != initial_type
          && self
            .load_next_pipeline(&pipeline_id, &initial_file_path, &asset)?
            .is_some()
        {
          final_assets.push(asset);
          continue;
        }

        let results = self
          .run_transformer(pipeline, &mut asset, &node)
          .map_err(|err| {
            vec![Diagnostic::from_error(
              &err,
              Some(&node.name),
              Some(absolute_path.clone()),
            )]
          })?;
        for result in results {
          resulting_assets.push(asset.create_child_asset(
            result,
            &node.name,
            self.config.file_path.clone(),
            node.config_key_path.clone(),
          ));
        }
      }
      input_assets = resulting_assets;
    }

    // The last transformer may have left dirty ASTs behind. Generate
    // content for them now, in parallel, except where generation is
    // deferred to the packaging stage.
    let generate = pipeline.generate.clone();
    let mode = self.options.mode;
    let plugin_options = self.plugin_options.clone();
    input_assets
      .par_iter_mut()
      .try_for_each(|asset| -> anyhow::Result<()> {
        if asset.ast.is_some() && asset.is_ast_dirty && !should_defer_generation(asset, mode) {
          match &generate {
            Some(generate) => generate(asset, &plugin_options)?,
            None => {
              panic!("Asset has an AST but no generate method is available on the transformer")
            }
          }
        }
        Ok(())
      })
      .map_err(|err| {
        vec![Diagnostic::from_error(
          &err,
          None,
          Some(absolute_path.clone()),
        )]
      })?;

    final_assets.extend(input_assets);
    Ok(final_assets)
  }

  /// Runs one transformer over one asset and normalizes its outputs into
  /// raw results.
  fn run_transformer(
    &self,
    pipeline: &mut Pipeline,
    asset: &mut UncommittedAsset,
    node: &TransformerNode,
  ) -> anyhow::Result<Vec<RawAsset>> {
    let plugin = node.plugin.clone();
    let logger = PluginLogger::new(&node.name);
    let resolve = self.make_resolve(pipeline.resolver.clone());

    // A dirty AST the incoming transformer cannot reuse is materialized
    // into content first, using the transformer that produced it.
    if asset.ast.is_some() && asset.is_ast_dirty {
      let reusable = match (&plugin.can_reuse_ast, asset.ast.clone()) {
        (Some(can_reuse_ast), Some(ast)) => can_reuse_ast(CanReuseAstContext {
          ast: ast.as_ref(),
          options: &self.plugin_options,
          logger: &logger,
        }),
        _ => false,
      };
      if !reusable {
        let generate = pipeline.generate.clone().unwrap_or_else(|| {
          panic!("Asset has an AST but no generate method is available on the transformer")
        });
        generate(asset, &self.plugin_options)?;
      }
    }

    if asset.ast.is_none() {
      if let Some(parse) = plugin.parse.clone() {
        let ast = parse(ParseContext {
          asset: MutableAsset::new(asset),
          config: node.config.as_deref(),
          options: &self.plugin_options,
          resolve: resolve.as_ref(),
          logger: &logger,
        })?;
        if let Some(ast) = ast {
          asset.attach_ast(ast);
        }
      }
    }

    let outputs = match plugin.transform.clone() {
      Some(transform) => transform(TransformContext {
        asset: MutableAsset::new(asset),
        config: node.config.as_deref(),
        options: &self.plugin_options,
        resolve: resolve.as_ref(),
        logger: &logger,
      })?,
      None => vec![TransformerOutput::Asset],
    };

    let generate_plugin = node.plugin.clone();
    let name = node.name.clone();
    pipeline.generate = Some(Arc::new(
      move |asset: &mut UncommittedAsset, options: &PluginOptions| {
        let Some(ast) = asset.ast.clone() else {
          return Ok(());
        };
        let Some(generate) = generate_plugin.generate.clone() else {
          panic!(
            "Asset has an AST but no generate method is available on the transformer {}",
            name
          );
        };
        let logger = PluginLogger::new(&name);
        let output = generate(GenerateContext {
          asset: &asset.value,
          ast: ast.as_ref(),
          options,
          logger: &logger,
        })?;
        asset.content = Some(output.content);
        asset.map_buffer = output.map;
        asset.clear_ast();
        Ok(())
      },
    ));

    Ok(
      outputs
        .into_iter()
        .map(|output| match output {
          TransformerOutput::Asset => asset.as_raw_result(),
          TransformerOutput::Result(raw) => raw,
        })
        .collect(),
    )
  }

  /// Builds the resolve closure handed to plugins: absolute paths map to
  /// project paths on the way in and back on the way out, and resolution
  /// side effects land in the shared invalidation trackers.
  fn make_resolve(&self, resolver: ResolverRef) -> Box<Resolve> {
    let invalidations = self.invalidations.clone();
    let project_root = self.options.project_root.clone();
    Box::new(move |from: &Path, specifier: &str| {
      let from = ProjectPath::from_absolute(&project_root, from);
      let resolution = resolver.resolve(&from, specifier)?;
      {
        let mut tracker = invalidations.lock();
        for file_path in resolution.invalidate_on_file_change {
          tracker.invalidate_on_file_change(file_path);
        }
        for invalidation in resolution.invalidate_on_file_create {
          tracker.invalidate_on_file_create(invalidation);
        }
      }
      Ok(resolution.file_path.to_absolute(&project_root))
    })
  }

  /// Digest of everything that could change a pipeline's behavior: its
  /// transformers, their dev-dep hashes, and each transformer's
  /// configuration state.
  pub(crate) fn get_pipeline_hash(&self, pipeline: &Pipeline) -> DiagnosticResult<String> {
    let mut hasher = Xxh3::default();
    for node in &pipeline.transformers {
      let key = dev_dep_key(&node.name, &node.resolve_from);
      // Request-supplied hashes are authoritative over ones accumulated
      // during this transformation.
      let dev_dep_hash = self
        .request
        .dev_deps
        .get(&key)
        .cloned()
        .or_else(|| {
          self
            .dev_dep_requests
            .get(&key)
            .map(|request| request.hash.clone())
        })
        .unwrap_or_default();
      hasher.update(dev_dep_hash.as_bytes());

      let Some(config) = self.configs.get(&node.name) else {
        continue;
      };
      hasher.update(config.id().as_bytes());
      if let Some(result_hash) = config.result_hash() {
        hasher.update(result_hash.as_bytes());
      } else if !config.included_files().is_empty() {
        let invalidations: Vec<RequestInvalidation> = config
          .included_files()
          .iter()
          .map(|file_path| RequestInvalidation::File {
            file_path: file_path.clone(),
          })
          .collect();
        hasher.update(get_invalidation_hash(&invalidations, &self.options).as_bytes());
      } else if let Some(result) = config.result() {
        let json = result.to_json().map_err(|_| {
          vec![Diagnostic::new(format!(
            "Config result is not hashable for plugin {}. Set a result hash manually instead.",
            node.name
          ))
          .with_origin(node.name.clone())
          .with_file_path(self.absolute_request_path())]
        })?;
        hasher.update(json.to_string().as_bytes());
      }

      for dev_dep in config.dev_deps() {
        let key = dev_dep.key();
        let request = self
          .dev_dep_requests
          .get(&key)
          .unwrap_or_else(|| panic!("missing dev dependency hash for {}", key));
        hasher.update(request.hash.as_bytes());
      }
    }
    Ok(format!("{:032x}", hasher.digest128()))
  }

  /// Deterministic digest identifying a transformation's output under
  /// fixed inputs. Query entries are sorted so their order never changes
  /// the key.
  pub(crate) fn get_cache_key(
    &self,
    assets: &[&UncommittedAsset],
    invalidation_hash: &str,
    pipeline_hash: &str,
  ) -> String {
    let snapshots = assets
      .iter()
      .map(|asset| {
        let mut query: Vec<(&str, &str)> = asset
          .value
          .query
          .iter()
          .flatten()
          .map(|(key, value)| (key.as_str(), value.as_str()))
          .collect();
        query.sort();
        AssetSnapshot {
          file_path: &asset.value.file_path,
          pipeline: asset.value.pipeline.as_deref(),
          hash: asset.value.hash.as_deref(),
          unique_key: asset.value.unique_key.as_deref(),
          query,
        }
      })
      .collect();

    let input = CacheKeyInput {
      bundler_version: SKEIN_VERSION,
      assets: snapshots,
      env: self.request.env.as_ref(),
      invalidation_hash,
      pipeline_hash,
    };
    hash_object(&input).expect("cache key input is serializable")
  }

  fn can_use_cache(&self) -> bool {
    !self.options.should_disable_cache
      && self.request.code.is_none()
      && !self
        .request
        .invalidate_reason
        .contains(InvalidateReason::FILE_CREATE)
  }

  fn read_from_cache(&self, cache_key: &str) -> anyhow::Result<Option<Vec<UncommittedAsset>>> {
    if !self.can_use_cache() {
      return Ok(None);
    }
    let Some(bytes) = self.options.cache.get(cache_key)? else {
      return Ok(None);
    };
    // Value records are JSON encoded: plugin metadata is schemaless, which
    // a non-self-describing encoding cannot round-trip. Bulk payloads live
    // in separate blobs.
    let records: Vec<CachedAsset> = match serde_json::from_slice(&bytes) {
      Ok(records) => records,
      Err(err) => {
        tracing::debug!("discarding undecodable cache entry {}: {}", cache_key, err);
        return Ok(None);
      }
    };

    let mut assets = Vec::with_capacity(records.len());
    for CachedAsset { id_base, value } in records {
      let content = match &value.content_key {
        Some(key) => match self.options.cache.get_blob(key)? {
          Some(content) => Some(content),
          // A missing blob means the entry was partially evicted.
          None => return Ok(None),
        },
        None => None,
      };
      let map_buffer = match &value.map_key {
        Some(key) => self.options.cache.get_blob(key)?,
        None => None,
      };
      let ast = match &value.ast_key {
        Some(key) => match self.options.cache.get_blob(key)? {
          Some(bytes) => match bincode::deserialize(&bytes) {
            Ok(ast) => Some(ast),
            Err(_) => return Ok(None),
          },
          None => return Ok(None),
        },
        None => None,
      };
      assets.push(UncommittedAsset::from_cached(
        value,
        content,
        map_buffer,
        ast,
        id_base,
        self.options.clone(),
        self.invalidations.clone(),
      ));
    }
    Ok(Some(assets))
  }

  fn write_to_cache(
    &self,
    cache_key: &str,
    assets: &mut [UncommittedAsset],
  ) -> anyhow::Result<()> {
    if !self.can_use_cache() {
      return Ok(());
    }
    let mut records = Vec::with_capacity(assets.len());
    for asset in assets.iter_mut() {
      asset.commit()?;
      records.push(CachedAsset {
        id_base: asset.id_base.clone(),
        value: asset.value.clone(),
      });
    }
    self.options.cache.set(cache_key, serde_json::to_vec(&records)?)
  }
}

/// Generation is deferred for assets the packaging stage regenerates
/// anyway: scope-hoisted JS, and CSS with symbols in production builds.
fn should_defer_generation(asset: &UncommittedAsset, mode: BuildMode) -> bool {
  (asset.value.file_type == FileType::Js && asset.value.env.should_scope_hoist())
    || (asset.value.file_type == FileType::Css
      && mode == BuildMode::Production
      && !asset.value.symbols.is_empty())
}
