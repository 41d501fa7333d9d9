use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use skein_core::cache::{Cache, InMemoryCache};
use skein_core::dev_dep::{BuildScope, DevDepRequest};
use skein_core::diagnostic::Diagnostic;
use skein_core::environment::{BuildMode, Environment, EnvironmentFlags};
use skein_core::file_system::InMemoryFileSystem;
use skein_core::hash::hash_bytes;
use skein_core::invalidation::{get_invalidation_hash, InvalidateReason, RequestInvalidation};
use skein_core::options::BuildOptions;
use skein_core::package_manager::{MockPackageManager, PackageInvalidations};
use skein_core::plugin::{ConfigResult, GeneratedOutput, RawAsset, Transformer, TransformerOutput};
use skein_core::project_config::{PipelineMap, PluginNode, ProjectConfig};
use skein_core::project_path::ProjectPath;
use skein_core::reporter::{BuildPhase, NullReporter, Reporter, ReporterEvent};
use skein_core::resolver::RelativePathResolver;
use skein_core::transformation::{Transformation, TransformationRequest, TransformationResult};
use skein_core::types::{Ast, FileType, Symbol};

const ROOT: &str = "/project";

struct Build {
  fs: Arc<InMemoryFileSystem>,
  cache: Arc<InMemoryCache>,
  package_manager: Arc<MockPackageManager>,
  options: Arc<BuildOptions>,
  config: Arc<ProjectConfig>,
}

fn node(name: &str) -> PluginNode {
  PluginNode {
    package_name: name.to_string(),
    resolve_from: format!("node_modules/{}", name).as_str().into(),
  }
}

fn build_with(
  mode: BuildMode,
  should_disable_cache: bool,
  patterns: &[(&str, &[&str])],
  plugins: Vec<(&str, Transformer)>,
) -> Build {
  let fs = Arc::new(InMemoryFileSystem::new());
  let cache = Arc::new(InMemoryCache::new());
  let package_manager = Arc::new(MockPackageManager::new());
  let options = Arc::new(BuildOptions {
    project_root: PathBuf::from(ROOT),
    mode,
    should_disable_cache,
    input_fs: fs.clone(),
    cache: cache.clone(),
    package_manager: package_manager.clone(),
    build_scope: Arc::new(BuildScope::new()),
  });

  let mut map = PipelineMap::default();
  for (pattern, names) in patterns {
    map.insert(*pattern, names.iter().map(|name| node(name)).collect());
  }
  let mut config = ProjectConfig::new(
    ".skeinrc".into(),
    map,
    Arc::new(RelativePathResolver::default()),
  );
  for (name, plugin) in plugins {
    package_manager.register(name, format!("{}/node_modules/{}/index.js", ROOT, name));
    config.register_plugin(name, plugin);
  }

  Build {
    fs,
    cache,
    package_manager,
    options,
    config: Arc::new(config),
  }
}

fn env() -> Arc<Environment> {
  Arc::new(Environment::default())
}

fn scope_hoist_env() -> Arc<Environment> {
  Arc::new(Environment {
    flags: EnvironmentFlags::SHOULD_SCOPE_HOIST,
    ..Environment::default()
  })
}

fn request(file_path: &str, env: Arc<Environment>) -> TransformationRequest {
  TransformationRequest {
    file_path: file_path.into(),
    code: None,
    env,
    pipeline: None,
    is_source: None,
    side_effects: None,
    query: None,
    dev_deps: HashMap::new(),
    invalidated_dev_deps: Vec::new(),
    invalidate_reason: InvalidateReason::default(),
    invalidations: Vec::new(),
  }
}

fn run(build: &Build, request: TransformationRequest) -> Result<TransformationResult, Vec<Diagnostic>> {
  Transformation::new(
    request,
    build.options.clone(),
    build.config.clone(),
    Arc::new(NullReporter),
  )
  .run()
}

fn passthrough(counter: Arc<AtomicUsize>) -> Transformer {
  Transformer {
    transform: Some(Arc::new(move |_ctx| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  }
}

fn change_type(to: FileType, counter: Arc<AtomicUsize>) -> Transformer {
  Transformer {
    transform: Some(Arc::new(move |mut ctx| {
      counter.fetch_add(1, Ordering::SeqCst);
      ctx.asset.set_file_type(to.clone());
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  }
}

fn minify_with_config() -> Transformer {
  Transformer {
    load_config: Some(Arc::new(|ctx| {
      ctx.config.add_included_file("minify.config.json".into());
      Ok(())
    })),
    transform: Some(Arc::new(|mut ctx| {
      let content = ctx.asset.content()?.to_vec();
      let minified: Vec<u8> = content
        .into_iter()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
      ctx.asset.set_content(minified);
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  }
}

fn ast_transformer(program: &'static [u8]) -> Transformer {
  Transformer {
    transform: Some(Arc::new(move |mut ctx| {
      ctx
        .asset
        .set_ast(Ast::new("transformer-ast", "1", program.to_vec()));
      Ok(vec![TransformerOutput::Asset])
    })),
    generate: Some(Arc::new(|ctx| {
      Ok(GeneratedOutput {
        content: ctx.ast.program.clone(),
        map: None,
      })
    })),
    ..Transformer::default()
  }
}

#[test]
fn identity_pipeline_is_stable_and_cached() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter.clone()))],
  );
  build.fs.write("/project/a.txt", "hi");

  let first = run(&build, request("a.txt", env())).unwrap();
  assert_eq!(first.assets.len(), 1);
  let asset = &first.assets[0];
  assert_eq!(asset.file_type, FileType::Other("txt".to_string()));
  assert_eq!(asset.hash.as_deref(), Some(hash_bytes(b"hi").as_str()));
  assert_eq!(counter.load(Ordering::SeqCst), 1);

  let content_key = asset.content_key.as_ref().expect("asset was committed");
  assert_eq!(build.cache.get_blob(content_key).unwrap().unwrap(), b"hi");

  // Identical inputs read back from the cache instead of re-running.
  let second = run(&build, request("a.txt", env())).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 1);
  assert_eq!(first.assets, second.assets);
}

#[test]
fn type_transition_chains_into_the_next_pipeline() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[
      ("*.ts", &["transformer-ts"]),
      ("*.js", &["transformer-min"]),
    ],
    vec![
      ("transformer-ts", change_type(FileType::Js, counter.clone())),
      ("transformer-min", minify_with_config()),
    ],
  );
  build.fs.write("/project/x.ts", "let  x  =  1 ;");

  let result = run(&build, request("x.ts", env())).unwrap();
  assert_eq!(result.assets.len(), 1);
  let asset = &result.assets[0];
  assert_eq!(asset.file_type, FileType::Js);
  assert_eq!(asset.plugin.as_deref(), Some("transformer-min"));

  let content_key = asset.content_key.as_ref().unwrap();
  assert_eq!(build.cache.get_blob(content_key).unwrap().unwrap(), b"letx=1;");

  // The config-bearing plugin reports its invalidation state.
  assert_eq!(result.config_requests.len(), 1);
  let config_request = &result.config_requests[0];
  assert_eq!(config_request.plugin_name, "transformer-min");
  assert_eq!(
    config_request.included_files,
    vec![ProjectPath::from("minify.config.json")]
  );
}

#[test]
fn inline_code_bypasses_the_cache_entirely() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.js", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter.clone()))],
  );

  let code = b"console.log(1)".to_vec();
  let mut inline = request("virtual.js", env());
  inline.code = Some(code.clone());
  let result = run(&build, inline.clone()).unwrap();

  let asset = &result.assets[0];
  assert!(asset.content_key.is_none());
  assert_eq!(asset.content.as_deref(), Some(code.as_slice()));
  assert_eq!(build.cache.len(), 0);
  assert!(!result.dev_dep_requests.is_empty());

  // No cache entry was written either, so a second run re-executes.
  run(&build, inline).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 2);

  // Inline assets derive their identity from the content, not the path.
  let mut renamed = request("other.js", env());
  renamed.code = Some(code);
  let result_renamed = run(&build, renamed).unwrap();
  assert_eq!(result.assets[0].id, result_renamed.assets[0].id);
}

#[test]
fn request_supplied_dev_dep_hash_short_circuits() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter))],
  );
  build.fs.write("/project/a.txt", "hi");

  let mut req = request("a.txt", env());
  req.dev_deps.insert(
    "transformer-noop:node_modules/transformer-noop".to_string(),
    "h".to_string(),
  );
  let result = run(&build, req).unwrap();

  assert_eq!(
    result.dev_dep_requests,
    vec![DevDepRequest::stripped(
      "transformer-noop".to_string(),
      "node_modules/transformer-noop".into(),
      "h".to_string(),
    )]
  );
  assert!(build.package_manager.resolve_calls().is_empty());
  assert!(build.package_manager.invalidation_queries().is_empty());
}

#[test]
fn unserializable_config_results_are_a_plugin_diagnostic() {
  #[derive(Debug)]
  struct Unhashable;

  impl ConfigResult for Unhashable {
    fn to_json(&self) -> anyhow::Result<serde_json::Value> {
      anyhow::bail!("cyclic value")
    }
  }

  let bad = Transformer {
    load_config: Some(Arc::new(|ctx| {
      ctx.config.set_result(Unhashable);
      Ok(())
    })),
    transform: Some(Arc::new(|_ctx| Ok(vec![TransformerOutput::Asset]))),
    ..Transformer::default()
  };

  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-bad"])],
    vec![("transformer-bad", bad)],
  );
  build.fs.write("/project/a.txt", "hi");

  let errors = run(&build, request("a.txt", env())).unwrap_err();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].origin.as_deref(), Some("transformer-bad"));
  assert!(errors[0].message.contains("Config result is not hashable"));
}

#[test]
fn generation_is_deferred_for_scope_hoisted_js() {
  let build = build_with(
    BuildMode::Development,
    true,
    &[("*.js", &["transformer-ast"])],
    vec![("transformer-ast", ast_transformer(b"GENERATED"))],
  );
  build.fs.write("/project/x.js", "original");

  // Scope hoisting defers generation: the AST survives, the content is
  // still the pre-transform bytes.
  let deferred = run(&build, request("x.js", scope_hoist_env())).unwrap();
  let asset = &deferred.assets[0];
  assert!(asset.is_ast_dirty);
  assert!(asset.ast.is_some());
  assert_eq!(asset.content.as_deref(), Some(b"original".as_slice()));

  // Without scope hoisting the AST is generated away.
  let generated = run(&build, request("x.js", env())).unwrap();
  let asset = &generated.assets[0];
  assert!(!asset.is_ast_dirty);
  assert!(asset.ast.is_none());
  assert_eq!(asset.content.as_deref(), Some(b"GENERATED".as_slice()));
}

#[test]
fn generation_is_deferred_for_production_css_with_symbols() {
  let css = Transformer {
    transform: Some(Arc::new(|mut ctx| {
      ctx.asset.set_ast(Ast::new("transformer-css", "1", b".a{}".to_vec()));
      ctx.asset.set_symbols(vec![Symbol {
        exported: "a".to_string(),
        local: "a".to_string(),
        is_weak: false,
      }]);
      Ok(vec![TransformerOutput::Asset])
    })),
    generate: Some(Arc::new(|ctx| {
      Ok(GeneratedOutput {
        content: ctx.ast.program.clone(),
        map: None,
      })
    })),
    ..Transformer::default()
  };

  let production = build_with(
    BuildMode::Production,
    true,
    &[("*.css", &["transformer-css"])],
    vec![("transformer-css", css.clone())],
  );
  production.fs.write("/project/style.css", "/* source */");
  let result = run(&production, request("style.css", env())).unwrap();
  assert!(result.assets[0].is_ast_dirty);
  assert!(result.assets[0].ast.is_some());

  let development = build_with(
    BuildMode::Development,
    true,
    &[("*.css", &["transformer-css"])],
    vec![("transformer-css", css)],
  );
  development.fs.write("/project/style.css", "/* source */");
  let result = run(&development, request("style.css", env())).unwrap();
  assert!(!result.assets[0].is_ast_dirty);
  assert_eq!(result.assets[0].content.as_deref(), Some(b".a{}".as_slice()));
}

#[test]
fn query_permutation_does_not_change_the_cache_key() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter.clone()))],
  );
  build.fs.write("/project/a.txt", "hi");

  let mut forward = IndexMap::new();
  forward.insert("a".to_string(), "1".to_string());
  forward.insert("b".to_string(), "2".to_string());
  let mut reversed = IndexMap::new();
  reversed.insert("b".to_string(), "2".to_string());
  reversed.insert("a".to_string(), "1".to_string());

  let mut first = request("a.txt", env());
  first.query = Some(forward);
  run(&build, first).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 1);

  let mut second = request("a.txt", env());
  second.query = Some(reversed);
  run(&build, second).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn cache_is_not_read_when_disabled_or_on_file_create() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter.clone()))],
  );
  build.fs.write("/project/a.txt", "hi");

  run(&build, request("a.txt", env())).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 1);

  // A FILE_CREATE re-run skips the cache read.
  let mut created = request("a.txt", env());
  created.invalidate_reason = InvalidateReason::FILE_CREATE;
  run(&build, created).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 2);

  let counter = Arc::new(AtomicUsize::new(0));
  let disabled = build_with(
    BuildMode::Development,
    true,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter.clone()))],
  );
  disabled.fs.write("/project/a.txt", "hi");
  run(&disabled, request("a.txt", env())).unwrap();
  run(&disabled, request("a.txt", env())).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn pipeline_hash_tracks_config_results_and_dev_dep_hashes() {
  let counter = Arc::new(AtomicUsize::new(0));
  let result_value = Arc::new(Mutex::new(serde_json::json!({"target": "es5"})));
  let result_for_plugin = result_value.clone();
  let transform_counter = counter.clone();
  let configured = Transformer {
    load_config: Some(Arc::new(move |ctx| {
      ctx.config.set_result(result_for_plugin.lock().clone());
      Ok(())
    })),
    transform: Some(Arc::new(move |_ctx| {
      transform_counter.fetch_add(1, Ordering::SeqCst);
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  };

  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-conf"])],
    vec![("transformer-conf", configured)],
  );
  build.fs.write("/project/a.txt", "hi");

  run(&build, request("a.txt", env())).unwrap();
  run(&build, request("a.txt", env())).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 1);

  // Changing the config result changes the pipeline hash, missing cache.
  *result_value.lock() = serde_json::json!({"target": "es2020"});
  run(&build, request("a.txt", env())).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 2);

  // A different request-supplied dev-dep hash also misses.
  let mut different_hash = request("a.txt", env());
  different_hash.dev_deps.insert(
    "transformer-conf:node_modules/transformer-conf".to_string(),
    "different".to_string(),
  );
  run(&build, different_hash).unwrap();
  assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn dev_dep_hash_matches_its_invalidation_set() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter))],
  );
  build.fs.write("/project/a.txt", "hi");
  build
    .fs
    .write("/project/node_modules/transformer-noop/index.js", "module");
  build.package_manager.register_invalidations(
    "transformer-noop",
    PackageInvalidations {
      invalidate_on_file_change: BTreeSet::from([PathBuf::from(
        "/project/node_modules/transformer-noop/index.js",
      )]),
      invalidate_on_file_create: Vec::new(),
    },
  );

  let result = run(&build, request("a.txt", env())).unwrap();
  let dev_dep = &result.dev_dep_requests[0];
  assert_eq!(
    dev_dep.invalidate_on_file_change,
    BTreeSet::from([ProjectPath::from("node_modules/transformer-noop/index.js")])
  );
  let expected = get_invalidation_hash(
    &[RequestInvalidation::File {
      file_path: "node_modules/transformer-noop/index.js".into(),
    }],
    &build.options,
  );
  assert_eq!(dev_dep.hash, expected);
}

#[test]
fn build_scoped_plugin_cache_strips_repeated_dev_deps() {
  let make_build = || {
    let counter = Arc::new(AtomicUsize::new(0));
    let build = build_with(
      BuildMode::Development,
      false,
      &[("*.txt", &["transformer-noop"])],
      vec![("transformer-noop", passthrough(counter))],
    );
    build.fs.write("/project/a.txt", "hi");
    build
      .fs
      .write("/project/node_modules/transformer-noop/index.js", "module");
    build.package_manager.register_invalidations(
      "transformer-noop",
      PackageInvalidations {
        invalidate_on_file_change: BTreeSet::from([PathBuf::from(
          "/project/node_modules/transformer-noop/index.js",
        )]),
        invalidate_on_file_create: Vec::new(),
      },
    );
    build
  };

  // First send carries the payload; the second, with the hash already in
  // the build-scoped cache, is stripped.
  let build = make_build();
  let first = run(&build, request("a.txt", env())).unwrap();
  assert!(!first.dev_dep_requests[0].invalidate_on_file_change.is_empty());
  let second = run(&build, request("a.txt", env())).unwrap();
  assert!(second.dev_dep_requests[0].invalidate_on_file_change.is_empty());
  assert_eq!(first.dev_dep_requests[0].hash, second.dev_dep_requests[0].hash);

  // A stale cached hash is replaced and the full payload sent.
  let build = make_build();
  build
    .options
    .build_scope
    .plugin_cache
    .insert("transformer-noop".to_string(), "stale".to_string());
  let result = run(&build, request("a.txt", env())).unwrap();
  assert!(!result.dev_dep_requests[0].invalidate_on_file_change.is_empty());
  let cached = build
    .options
    .build_scope
    .plugin_cache
    .get("transformer-noop")
    .map(|entry| entry.value().clone());
  assert_eq!(cached.as_deref(), Some(result.dev_dep_requests[0].hash.as_str()));
}

#[test]
fn chaining_to_the_same_pipeline_id_terminates() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[
      ("*.ts", &["transformer-totype"]),
      ("*.js", &["transformer-totype"]),
    ],
    vec![(
      "transformer-totype",
      change_type(FileType::Js, counter.clone()),
    )],
  );
  build.fs.write("/project/x.ts", "source");

  let result = run(&build, request("x.ts", env())).unwrap();
  // The emitted type resolves to the same pipeline identity, so the asset
  // is terminal and the transformer ran exactly once.
  assert_eq!(counter.load(Ordering::SeqCst), 1);
  assert_eq!(result.assets.len(), 1);
  assert_eq!(result.assets[0].file_type, FileType::Js);
}

#[test]
fn returning_no_outputs_drops_the_asset() {
  let dropper = Transformer {
    transform: Some(Arc::new(|_ctx| Ok(Vec::new()))),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-drop"])],
    vec![("transformer-drop", dropper)],
  );
  build.fs.write("/project/a.txt", "hi");

  let result = run(&build, request("a.txt", env())).unwrap();
  assert!(result.assets.is_empty());
}

#[test]
fn extra_raw_results_become_sibling_assets() {
  let splitter = Transformer {
    transform: Some(Arc::new(|_ctx| {
      Ok(vec![
        TransformerOutput::Asset,
        TransformerOutput::Result(RawAsset {
          file_type: Some(FileType::Css),
          content: Some(b"body{}".to_vec()),
          unique_key: Some("style".to_string()),
          ..RawAsset::default()
        }),
      ])
    })),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-split"])],
    vec![("transformer-split", splitter)],
  );
  build.fs.write("/project/a.txt", "hi");

  let result = run(&build, request("a.txt", env())).unwrap();
  assert_eq!(result.assets.len(), 2);
  assert_eq!(result.assets[0].file_type, FileType::Other("txt".to_string()));
  assert_eq!(result.assets[1].file_type, FileType::Css);
  assert_eq!(result.assets[1].unique_key.as_deref(), Some("style"));
  assert_ne!(result.assets[0].id, result.assets[1].id);
}

#[test]
fn invalidations_are_unique_and_cover_plugin_reads() {
  let reader = Transformer {
    transform: Some(Arc::new(|mut ctx| {
      ctx
        .asset
        .invalidate_on_file_change(Path::new("/project/dep.txt"));
      ctx
        .asset
        .invalidate_on_file_change(Path::new("/project/dep.txt"));
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-read"])],
    vec![("transformer-read", reader)],
  );
  build.fs.write("/project/a.txt", "hi");

  let result = run(&build, request("a.txt", env())).unwrap();
  let ids: Vec<String> = result
    .invalidations
    .iter()
    .map(|invalidation| invalidation.invalidation_id())
    .collect();
  let unique: BTreeSet<&String> = ids.iter().collect();
  assert_eq!(ids.len(), unique.len());
  assert_eq!(ids, vec!["file:dep.txt".to_string()]);
}

#[test]
fn dependencies_are_internalized_and_resolve_is_delegated() {
  let depender = Transformer {
    transform: Some(Arc::new(|mut ctx| {
      let resolved = (ctx.resolve)(Path::new("/project/src/a.txt"), "./style.css")?;
      assert_eq!(resolved, PathBuf::from("/project/src/style.css"));
      let mut dependency = skein_core::types::Dependency::new("./style.css");
      dependency.resolve_from = Some(ProjectPath::from(resolved.as_path()));
      ctx.asset.add_dependency(dependency);
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-dep"])],
    vec![("transformer-dep", depender)],
  );
  build.fs.write("/project/src/a.txt", "hi");

  let result = run(&build, request("src/a.txt", env())).unwrap();
  let dependency = &result.assets[0].dependencies[0];
  assert!(dependency.id.is_some());
  assert!(dependency.source_asset_id.is_some());
  assert_eq!(dependency.source_path, Some(ProjectPath::from("src/a.txt")));
  // The absolute resolve_from handed back by the plugin is stored
  // project-relative.
  assert_eq!(
    dependency.resolve_from,
    Some(ProjectPath::from("src/style.css"))
  );
}

#[test]
fn option_accesses_are_tracked_as_invalidations() {
  let optioned = Transformer {
    load_config: Some(Arc::new(|ctx| {
      if ctx.options.mode() == BuildMode::Production {
        ctx.config.invalidate_on_startup();
      }
      Ok(())
    })),
    transform: Some(Arc::new(|mut ctx| {
      // Consult the project root the way a path-rewriting transformer
      // would, so the access is recorded against this transformation.
      let root = ctx.options.project_root();
      let file_path = ctx.asset.file_path().to_absolute(&root);
      ctx
        .asset
        .meta_mut()
        .insert("sourceRoot".to_string(), file_path.display().to_string().into());
      Ok(vec![TransformerOutput::Asset])
    })),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-opt"])],
    vec![("transformer-opt", optioned)],
  );
  build.fs.write("/project/a.txt", "hi");

  let result = run(&build, request("a.txt", env())).unwrap();
  let ids: Vec<String> = result
    .invalidations
    .iter()
    .map(|invalidation| invalidation.invalidation_id())
    .collect();
  assert!(ids.contains(&"option:mode".to_string()));
  assert!(ids.contains(&"option:projectRoot".to_string()));
  assert_eq!(
    result.assets[0].meta.get("sourceRoot"),
    Some(&serde_json::json!("/project/a.txt"))
  );
}

#[test]
fn existing_source_maps_are_picked_up_and_failures_swallowed() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    true,
    &[("*.js", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter))],
  );
  build
    .fs
    .write("/project/x.js", "code\n//# sourceMappingURL=x.js.map\n");
  build.fs.write("/project/x.js.map", "{\"version\":3}");

  let result = run(&build, request("x.js", env())).unwrap();
  assert_eq!(
    result.assets[0].map.as_deref(),
    Some(b"{\"version\":3}".as_slice())
  );
  assert!(result
    .invalidations
    .iter()
    .any(|invalidation| invalidation.invalidation_id() == "file:x.js.map"));

  // A missing map file is not fatal.
  build
    .fs
    .write("/project/y.js", "code\n//# sourceMappingURL=missing.map\n");
  let result = run(&build, request("y.js", env())).unwrap();
  assert!(result.assets[0].map.is_none());
}

#[test]
fn invalidated_dev_deps_are_dropped_once_per_build() {
  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter))],
  );
  build.fs.write("/project/a.txt", "hi");

  let invalidated = skein_core::dev_dep::DevDepSpecifier {
    specifier: "transformer-noop".to_string(),
    resolve_from: "node_modules/transformer-noop".into(),
  };
  let mut first = request("a.txt", env());
  first.invalidated_dev_deps = vec![invalidated.clone()];
  run(&build, first).unwrap();
  assert_eq!(build.package_manager.invalidate_calls(), vec!["transformer-noop"]);

  // The build-scoped guard suppresses the second drop.
  let mut second = request("a.txt", env());
  second.invalidated_dev_deps = vec![invalidated];
  run(&build, second).unwrap();
  assert_eq!(build.package_manager.invalidate_calls(), vec!["transformer-noop"]);
}

#[test]
fn progress_is_reported_with_the_absolute_path() {
  #[derive(Default)]
  struct Recording {
    events: Mutex<Vec<ReporterEvent>>,
  }

  impl Reporter for Recording {
    fn report(&self, event: &ReporterEvent) -> anyhow::Result<()> {
      self.events.lock().push(event.clone());
      Ok(())
    }
  }

  let counter = Arc::new(AtomicUsize::new(0));
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-noop"])],
    vec![("transformer-noop", passthrough(counter))],
  );
  build.fs.write("/project/a.txt", "hi");

  let reporter = Arc::new(Recording::default());
  Transformation::new(
    request("a.txt", env()),
    build.options.clone(),
    build.config.clone(),
    reporter.clone(),
  )
  .run()
  .unwrap();

  let events = reporter.events.lock();
  assert_eq!(
    events[0],
    ReporterEvent::BuildProgress {
      phase: BuildPhase::Transforming,
      file_path: PathBuf::from("/project/a.txt"),
    }
  );
}

#[test]
fn transformer_failures_carry_origin_and_absolute_path() {
  let failing = Transformer {
    transform: Some(Arc::new(|_ctx| anyhow::bail!("unexpected token"))),
    ..Transformer::default()
  };
  let build = build_with(
    BuildMode::Development,
    false,
    &[("*.txt", &["transformer-fail"])],
    vec![("transformer-fail", failing)],
  );
  build.fs.write("/project/a.txt", "hi");

  let errors = run(&build, request("a.txt", env())).unwrap_err();
  assert_eq!(errors[0].origin.as_deref(), Some("transformer-fail"));
  assert_eq!(errors[0].file_path.as_deref(), Some(Path::new("/project/a.txt")));
  assert!(errors[0].message.contains("unexpected token"));
  // A failed transformation writes nothing.
  assert_eq!(build.cache.len(), 0);
}
