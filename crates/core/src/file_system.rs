use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

/// Read access to input files. The real build uses the OS filesystem;
/// tests and editor integrations provide in-memory overlays.
pub trait FileSystem: Send + Sync {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
  }
}

pub type FileSystemRef = Arc<dyn FileSystem>;

#[derive(Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    std::fs::read(path)
  }
}

/// An in-memory filesystem keyed by absolute path.
#[derive(Default)]
pub struct InMemoryFileSystem {
  files: DashMap<PathBuf, Vec<u8>>,
}

impl InMemoryFileSystem {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn write(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
    self.files.insert(path.into(), contents.into());
  }

  pub fn remove(&self, path: &Path) {
    self.files.remove(path);
  }
}

impl FileSystem for InMemoryFileSystem {
  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    self
      .files
      .get(path)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| {
        io::Error::new(
          io::ErrorKind::NotFound,
          format!("file not found: {}", path.display()),
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn in_memory_reads_back_writes() {
    let fs = InMemoryFileSystem::new();
    fs.write("/project/a.txt", "hi");
    assert_eq!(fs.read(Path::new("/project/a.txt")).unwrap(), b"hi");
    assert!(fs.read(Path::new("/project/missing.txt")).is_err());
  }
}
