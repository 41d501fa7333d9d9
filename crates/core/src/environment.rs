use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::bitflags_serde;

/// The environment an asset is being built for. Assets with different
/// environments are transformed independently, and the environment
/// participates in every cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
  pub context: EnvironmentContext,
  pub output_format: OutputFormat,
  pub source_type: SourceType,
  #[serde(default)]
  pub engines: Engines,
  pub flags: EnvironmentFlags,
}

impl Environment {
  pub fn should_scope_hoist(&self) -> bool {
    self.flags.contains(EnvironmentFlags::SHOULD_SCOPE_HOIST)
  }
}

/// Minimum engine versions the output must support, as semver ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engines {
  #[serde(default)]
  pub browsers: Vec<String>,
  #[serde(default)]
  pub electron: Option<String>,
  #[serde(default)]
  pub node: Option<String>,
}

bitflags! {
  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
  pub struct EnvironmentFlags: u8 {
    const SHOULD_SCOPE_HOIST = 1 << 0;
  }
}

bitflags_serde!(EnvironmentFlags, u8);

impl Default for EnvironmentFlags {
  fn default() -> Self {
    EnvironmentFlags::empty()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EnvironmentContext {
  Browser = 0,
  WebWorker = 1,
  ServiceWorker = 2,
  Worklet = 3,
  Node = 4,
  ElectronMain = 5,
  ElectronRenderer = 6,
}

impl Default for EnvironmentContext {
  fn default() -> Self {
    EnvironmentContext::Browser
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SourceType {
  Module = 0,
  Script = 1,
}

impl Default for SourceType {
  fn default() -> Self {
    SourceType::Module
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum OutputFormat {
  Global = 0,
  Commonjs = 1,
  Esmodule = 2,
}

impl Default for OutputFormat {
  fn default() -> Self {
    OutputFormat::Global
  }
}

/// The overall build mode. Selected once per build; affects when generation
/// of transformed content may be deferred to packaging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  Development,
  Production,
}

impl Default for BuildMode {
  fn default() -> Self {
    BuildMode::Development
  }
}

impl std::fmt::Display for BuildMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BuildMode::Development => write!(f, "development"),
      BuildMode::Production => write!(f, "production"),
    }
  }
}
