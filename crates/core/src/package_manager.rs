use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::invalidation::FileCreateInvalidation;

/// Files that, when changed or created, invalidate a resolved package and
/// everything that depends on it. Paths are absolute; the core converts
/// them to project-relative form before recording them.
#[derive(Clone, Debug, Default)]
pub struct PackageInvalidations {
  pub invalidate_on_file_change: BTreeSet<PathBuf>,
  pub invalidate_on_file_create: Vec<FileCreateInvalidation>,
}

/// Resolves build-time packages (transformer plugins and their
/// dependencies) and reports what would invalidate those resolutions.
pub trait PackageManager: Send + Sync {
  fn resolve(&self, specifier: &str, from: &Path) -> anyhow::Result<PathBuf>;
  fn invalidate(&self, specifier: &str, from: &Path);
  fn get_invalidations(&self, specifier: &str, from: &Path) -> PackageInvalidations;
}

pub type PackageManagerRef = Arc<dyn PackageManager>;

/// A scriptable package manager for tests: resolutions and invalidation
/// sets are registered up front, and every call is recorded so tests can
/// assert what the core asked for.
#[derive(Default)]
pub struct MockPackageManager {
  resolutions: DashMap<String, PathBuf>,
  invalidations: DashMap<String, PackageInvalidations>,
  resolve_calls: Mutex<Vec<String>>,
  invalidation_queries: Mutex<Vec<String>>,
  invalidate_calls: Mutex<Vec<String>>,
}

impl MockPackageManager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, specifier: &str, resolved: impl Into<PathBuf>) {
    self.resolutions.insert(specifier.to_string(), resolved.into());
  }

  pub fn register_invalidations(&self, specifier: &str, invalidations: PackageInvalidations) {
    self
      .invalidations
      .insert(specifier.to_string(), invalidations);
  }

  pub fn resolve_calls(&self) -> Vec<String> {
    self.resolve_calls.lock().clone()
  }

  pub fn invalidation_queries(&self) -> Vec<String> {
    self.invalidation_queries.lock().clone()
  }

  pub fn invalidate_calls(&self) -> Vec<String> {
    self.invalidate_calls.lock().clone()
  }
}

impl PackageManager for MockPackageManager {
  fn resolve(&self, specifier: &str, _from: &Path) -> anyhow::Result<PathBuf> {
    self.resolve_calls.lock().push(specifier.to_string());
    self
      .resolutions
      .get(specifier)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| anyhow::anyhow!("failed to resolve {}", specifier))
  }

  fn invalidate(&self, specifier: &str, _from: &Path) {
    self.invalidate_calls.lock().push(specifier.to_string());
  }

  fn get_invalidations(&self, specifier: &str, _from: &Path) -> PackageInvalidations {
    self
      .invalidation_queries
      .lock()
      .push(specifier.to_string());
    self
      .invalidations
      .get(specifier)
      .map(|entry| entry.value().clone())
      .unwrap_or_default()
  }
}
