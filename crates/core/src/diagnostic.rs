use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A structured, user-facing error produced by the core or by a plugin.
///
/// Plugin failures are annotated with the plugin name as `origin` and the
/// absolute path of the source file being transformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  pub message: String,
  #[serde(default)]
  pub origin: Option<String>,
  #[serde(default)]
  pub file_path: Option<PathBuf>,
}

impl Diagnostic {
  pub fn new(message: impl Into<String>) -> Self {
    Diagnostic {
      message: message.into(),
      origin: None,
      file_path: None,
    }
  }

  pub fn from_error(error: &anyhow::Error, origin: Option<&str>, file_path: Option<PathBuf>) -> Self {
    Diagnostic {
      // `{:#}` flattens the cause chain into one line.
      message: format!("{:#}", error),
      origin: origin.map(|origin| origin.to_string()),
      file_path,
    }
  }

  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = Some(origin.into());
    self
  }

  pub fn with_file_path(mut self, file_path: PathBuf) -> Self {
    self.file_path = Some(file_path);
    self
  }
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.origin {
      Some(origin) => write!(f, "{}: {}", origin, self.message),
      None => write!(f, "{}", self.message),
    }
  }
}

pub type DiagnosticResult<T> = Result<T, Vec<Diagnostic>>;
