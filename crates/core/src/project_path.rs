use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A path relative to the project root.
///
/// All paths stored inside the core are project-relative so that cache keys
/// and invalidation records are portable between machines. Conversion to and
/// from absolute paths happens only at the plugin and filesystem boundaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectPath(PathBuf);

impl ProjectPath {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    ProjectPath(path.into())
  }

  /// Strips the project root from an absolute path. Paths outside the
  /// project root are kept as-is so they still resolve via `to_absolute`.
  pub fn from_absolute(project_root: &Path, path: &Path) -> Self {
    match path.strip_prefix(project_root) {
      Ok(relative) => ProjectPath(relative.to_path_buf()),
      Err(_) => ProjectPath(path.to_path_buf()),
    }
  }

  pub fn to_absolute(&self, project_root: &Path) -> PathBuf {
    if self.0.is_absolute() {
      self.0.clone()
    } else {
      project_root.join(&self.0)
    }
  }

  pub fn as_path(&self) -> &Path {
    &self.0
  }

  pub fn extension(&self) -> Option<&str> {
    self.0.extension().and_then(|ext| ext.to_str())
  }

  /// Replaces the extension, keeping the original stem.
  pub fn with_extension(&self, extension: &str) -> Self {
    ProjectPath(self.0.with_extension(extension))
  }

  pub fn to_string_lossy(&self) -> String {
    self.0.to_string_lossy().into_owned()
  }
}

impl From<&str> for ProjectPath {
  fn from(path: &str) -> Self {
    ProjectPath(PathBuf::from(path))
  }
}

impl From<PathBuf> for ProjectPath {
  fn from(path: PathBuf) -> Self {
    ProjectPath(path)
  }
}

impl From<&Path> for ProjectPath {
  fn from(path: &Path) -> Self {
    ProjectPath(path.to_path_buf())
  }
}

impl AsRef<Path> for ProjectPath {
  fn as_ref(&self) -> &Path {
    &self.0
  }
}

impl std::fmt::Display for ProjectPath {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.display())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_the_project_root() {
    let root = Path::new("/project");
    let relative = ProjectPath::from_absolute(root, Path::new("/project/src/app.ts"));
    assert_eq!(relative, ProjectPath::from("src/app.ts"));
    assert_eq!(relative.to_absolute(root), PathBuf::from("/project/src/app.ts"));
  }

  #[test]
  fn keeps_paths_outside_the_root() {
    let root = Path::new("/project");
    let outside = ProjectPath::from_absolute(root, Path::new("/elsewhere/lib.js"));
    assert_eq!(outside.to_absolute(root), PathBuf::from("/elsewhere/lib.js"));
  }

  #[test]
  fn replaces_extensions() {
    let path = ProjectPath::from("src/app.ts");
    assert_eq!(path.with_extension("js"), ProjectPath::from("src/app.js"));
  }
}
