use std::sync::Arc;

use crate::invalidation::FileCreateInvalidation;
use crate::project_path::ProjectPath;

/// The outcome of resolving a specifier, including everything that would
/// invalidate the resolution. Paths are project-relative.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
  pub file_path: ProjectPath,
  pub invalidate_on_file_change: Vec<ProjectPath>,
  pub invalidate_on_file_create: Vec<FileCreateInvalidation>,
}

/// Module resolution, delegated to an external resolver. Each pipeline is
/// handed a resolver scoped to it.
pub trait Resolver: Send + Sync {
  fn resolve(&self, from: &ProjectPath, specifier: &str) -> anyhow::Result<Resolution>;
}

pub type ResolverRef = Arc<dyn Resolver>;

/// Resolves `./` and `../` specifiers against the importing file's
/// directory. Enough for builds whose plugins only reference sibling files;
/// real module resolution plugs in through the same trait.
#[derive(Default)]
pub struct RelativePathResolver;

impl Resolver for RelativePathResolver {
  fn resolve(&self, from: &ProjectPath, specifier: &str) -> anyhow::Result<Resolution> {
    let base = from
      .as_path()
      .parent()
      .unwrap_or_else(|| std::path::Path::new(""));
    let mut resolved = base.to_path_buf();
    for component in std::path::Path::new(specifier).components() {
      match component {
        std::path::Component::CurDir => {}
        std::path::Component::ParentDir => {
          resolved.pop();
        }
        other => resolved.push(other),
      }
    }
    Ok(Resolution {
      file_path: ProjectPath::from(resolved),
      invalidate_on_file_change: Vec::new(),
      invalidate_on_file_create: Vec::new(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_relative_specifiers() {
    let resolver = RelativePathResolver::default();
    let resolution = resolver
      .resolve(&ProjectPath::from("src/pages/index.ts"), "../lib/util.ts")
      .unwrap();
    assert_eq!(resolution.file_path, ProjectPath::from("src/lib/util.ts"));

    let sibling = resolver
      .resolve(&ProjectPath::from("src/pages/index.ts"), "./style.css")
      .unwrap();
    assert_eq!(sibling.file_path, ProjectPath::from("src/pages/style.css"));
  }
}
