use std::path::PathBuf;
use std::sync::Arc;

use crate::environment::BuildMode;
use crate::invalidation::SharedInvalidations;
use crate::options::BuildOptions;

/// The options facade handed to plugins.
///
/// Every accessor records an option invalidation, so work that consulted an
/// option is re-run when that option changes.
#[derive(Clone)]
pub struct PluginOptions {
  options: Arc<BuildOptions>,
  invalidations: SharedInvalidations,
}

impl PluginOptions {
  pub(crate) fn new(options: Arc<BuildOptions>, invalidations: SharedInvalidations) -> Self {
    PluginOptions {
      options,
      invalidations,
    }
  }

  pub fn mode(&self) -> BuildMode {
    self.track("mode");
    self.options.mode
  }

  pub fn project_root(&self) -> PathBuf {
    self.track("projectRoot");
    self.options.project_root.clone()
  }

  fn track(&self, key: &str) {
    self.invalidations.lock().invalidate_on_option_change(key);
  }
}

/// A logger scoped to one plugin; messages are attributed to it.
#[derive(Clone, Debug, Default)]
pub struct PluginLogger {
  origin: Option<String>,
}

impl PluginLogger {
  pub fn new(origin: impl Into<String>) -> Self {
    PluginLogger {
      origin: Some(origin.into()),
    }
  }

  pub fn info(&self, message: &str) {
    tracing::info!(origin = self.origin.as_deref(), "{}", message);
  }

  pub fn warn(&self, message: &str) {
    tracing::warn!(origin = self.origin.as_deref(), "{}", message);
  }

  pub fn error(&self, message: &str) {
    tracing::error!(origin = self.origin.as_deref(), "{}", message);
  }

  pub fn verbose(&self, message: &str) {
    tracing::debug!(origin = self.origin.as_deref(), "{}", message);
  }
}
