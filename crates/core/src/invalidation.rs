use std::path::Path;
use std::sync::Arc;

use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::bitflags_serde;
use crate::hash::hash_bytes;
use crate::options::BuildOptions;
use crate::project_path::ProjectPath;

/// A record telling the incremental build graph when to re-run a
/// transformation: a file that was read, or an option that was consulted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestInvalidation {
  #[serde(rename_all = "camelCase")]
  File { file_path: ProjectPath },
  #[serde(rename_all = "camelCase")]
  Option { key: String },
}

impl RequestInvalidation {
  /// Canonical identity used for deduplication and sorting.
  pub fn invalidation_id(&self) -> String {
    match self {
      RequestInvalidation::File { file_path } => format!("file:{}", file_path),
      RequestInvalidation::Option { key } => format!("option:{}", key),
    }
  }
}

/// A pattern for files that do not exist yet but would affect this
/// transformation if created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FileCreateInvalidation {
  #[serde(rename_all = "camelCase")]
  File { file_path: ProjectPath },
  #[serde(rename_all = "camelCase")]
  Glob { glob: String },
  /// A file with the given name created anywhere above a path, e.g. a
  /// package.json appearing closer to the source than the one in use.
  #[serde(rename_all = "camelCase")]
  FileAbove {
    file_name: String,
    above_file_path: ProjectPath,
  },
}

/// Converts the absolute paths reported by external collaborators into
/// project-relative form for storage.
pub fn file_create_to_project(
  project_root: &Path,
  invalidation: FileCreateInvalidation,
) -> FileCreateInvalidation {
  match invalidation {
    FileCreateInvalidation::File { file_path } => FileCreateInvalidation::File {
      file_path: ProjectPath::from_absolute(project_root, file_path.as_path()),
    },
    FileCreateInvalidation::FileAbove {
      file_name,
      above_file_path,
    } => FileCreateInvalidation::FileAbove {
      file_name,
      above_file_path: ProjectPath::from_absolute(project_root, above_file_path.as_path()),
    },
    glob => glob,
  }
}

bitflags! {
  /// Why the upstream graph decided to re-run this transformation.
  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
  pub struct InvalidateReason: u8 {
    const FILE_CREATE = 1 << 0;
    const FILE_UPDATE = 1 << 1;
    const FILE_DELETE = 1 << 2;
    const OPTION_CHANGE = 1 << 3;
    const STARTUP = 1 << 4;
  }
}

bitflags_serde!(InvalidateReason, u8);

impl Default for InvalidateReason {
  fn default() -> Self {
    InvalidateReason::empty()
  }
}

/// Accumulates invalidations observed during one transformation,
/// deduplicated by canonical identity. Shared between the transformation
/// and every asset it constructs.
#[derive(Debug, Default)]
pub struct Invalidations {
  invalidations: IndexMap<String, RequestInvalidation>,
  invalidate_on_file_create: IndexSet<FileCreateInvalidation>,
}

impl Invalidations {
  pub fn invalidate_on_file_change(&mut self, file_path: ProjectPath) {
    let invalidation = RequestInvalidation::File { file_path };
    self
      .invalidations
      .insert(invalidation.invalidation_id(), invalidation);
  }

  pub fn invalidate_on_option_change(&mut self, key: impl Into<String>) {
    let invalidation = RequestInvalidation::Option { key: key.into() };
    self
      .invalidations
      .insert(invalidation.invalidation_id(), invalidation);
  }

  pub fn invalidate_on_file_create(&mut self, invalidation: FileCreateInvalidation) {
    self.invalidate_on_file_create.insert(invalidation);
  }

  pub fn invalidations(&self) -> Vec<RequestInvalidation> {
    self.invalidations.values().cloned().collect()
  }

  pub fn file_create_invalidations(&self) -> Vec<FileCreateInvalidation> {
    self.invalidate_on_file_create.iter().cloned().collect()
  }
}

pub type SharedInvalidations = Arc<Mutex<Invalidations>>;

/// Digest of a set of invalidations.
///
/// Entries are sorted by canonical id so the hash is order-independent.
/// File invalidations contribute the current content hash of the file, so
/// the digest changes when any watched file changes; unreadable files
/// contribute nothing beyond their id. An empty set hashes to the empty
/// string, which keeps "no invalidations" stable across runs.
pub fn get_invalidation_hash(
  invalidations: &[RequestInvalidation],
  options: &BuildOptions,
) -> String {
  if invalidations.is_empty() {
    return String::new();
  }

  let mut sorted: Vec<&RequestInvalidation> = invalidations.iter().collect();
  sorted.sort_by_key(|invalidation| invalidation.invalidation_id());
  sorted.dedup_by_key(|invalidation| invalidation.invalidation_id());

  let mut hasher = Xxh3::default();
  for invalidation in sorted {
    hasher.update(invalidation.invalidation_id().as_bytes());
    match invalidation {
      RequestInvalidation::File { file_path } => {
        let absolute = file_path.to_absolute(&options.project_root);
        if let Ok(contents) = options.input_fs.read(&absolute) {
          hasher.update(hash_bytes(&contents).as_bytes());
        }
      }
      RequestInvalidation::Option { key } => {
        if let Some(value) = options.option_value(key) {
          hasher.update(value.as_bytes());
        }
      }
    }
  }
  format!("{:032x}", hasher.digest128())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deduplicates_by_identity() {
    let mut invalidations = Invalidations::default();
    invalidations.invalidate_on_file_change("src/a.txt".into());
    invalidations.invalidate_on_file_change("src/a.txt".into());
    invalidations.invalidate_on_option_change("mode");
    invalidations.invalidate_on_option_change("mode");
    assert_eq!(invalidations.invalidations().len(), 2);

    invalidations.invalidate_on_file_create(FileCreateInvalidation::Glob {
      glob: "**/.env".into(),
    });
    invalidations.invalidate_on_file_create(FileCreateInvalidation::Glob {
      glob: "**/.env".into(),
    });
    assert_eq!(invalidations.file_create_invalidations().len(), 1);
  }

  #[test]
  fn invalidation_ids_are_canonical() {
    let file = RequestInvalidation::File {
      file_path: "src/a.txt".into(),
    };
    assert_eq!(file.invalidation_id(), "file:src/a.txt");
    let option = RequestInvalidation::Option { key: "mode".into() };
    assert_eq!(option.invalidation_id(), "option:mode");
  }
}
