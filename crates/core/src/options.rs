use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheRef;
use crate::dev_dep::BuildScope;
use crate::environment::BuildMode;
use crate::file_system::FileSystemRef;
use crate::package_manager::PackageManagerRef;

/// Global options for one build, shared by every transformation dispatched
/// during it.
pub struct BuildOptions {
  pub project_root: PathBuf,
  pub mode: BuildMode,
  pub should_disable_cache: bool,
  pub input_fs: FileSystemRef,
  pub cache: CacheRef,
  pub package_manager: PackageManagerRef,
  /// Process-wide state with a build-scoped lifecycle; the scheduler resets
  /// it at build boundaries.
  pub build_scope: Arc<BuildScope>,
}

impl BuildOptions {
  /// Looks up the value of a trackable option by key, for invalidation
  /// hashing. Keys match the accessors on the plugin options facade.
  pub fn option_value(&self, key: &str) -> Option<String> {
    match key {
      "mode" => Some(self.mode.to_string()),
      "projectRoot" => Some(self.project_root.display().to_string()),
      "shouldDisableCache" => Some(self.should_disable_cache.to_string()),
      _ => None,
    }
  }
}
