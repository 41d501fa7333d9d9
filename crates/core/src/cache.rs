use std::sync::Arc;

use dashmap::DashMap;

/// The persistent cache backend.
///
/// Entries are opaque serialized records keyed by cache key; blobs hold
/// asset content, source maps, and serialized ASTs, keyed by the
/// `content_key`/`map_key`/`ast_key` stored on the asset value.
pub trait Cache: Send + Sync {
  fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
  fn set(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
  fn get_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
  fn set_blob(&self, key: &str, blob: Vec<u8>) -> anyhow::Result<()>;

  /// Streaming access for large blobs. Backends that store blobs out of
  /// memory should override this.
  fn get_stream(&self, key: &str) -> anyhow::Result<Option<Box<dyn std::io::Read + Send>>> {
    Ok(
      self
        .get_blob(key)?
        .map(|blob| Box::new(std::io::Cursor::new(blob)) as Box<dyn std::io::Read + Send>),
    )
  }
}

pub type CacheRef = Arc<dyn Cache>;

/// An in-memory cache, used by tests and as a stand-in when persistence is
/// handled elsewhere.
#[derive(Default)]
pub struct InMemoryCache {
  entries: DashMap<String, Vec<u8>>,
  blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Cache for InMemoryCache {
  fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(self.entries.get(key).map(|entry| entry.value().clone()))
  }

  fn set(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
    self.entries.insert(key.to_string(), value);
    Ok(())
  }

  fn get_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
  }

  fn set_blob(&self, key: &str, blob: Vec<u8>) -> anyhow::Result<()> {
    self.blobs.insert(key.to_string(), blob);
    Ok(())
  }
}
