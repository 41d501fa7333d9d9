use serde::{Deserialize, Serialize};

/// The type of an asset, initially derived from its file extension and
/// reassigned by transformers as the asset changes representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
  Js,
  Jsx,
  Ts,
  Tsx,
  Css,
  Html,
  Json,
  Map,
  Other(String),
}

impl FileType {
  pub fn from_extension(extension: &str) -> FileType {
    match extension {
      "js" | "mjs" | "cjs" => FileType::Js,
      "jsx" => FileType::Jsx,
      "ts" | "mts" | "cts" => FileType::Ts,
      "tsx" => FileType::Tsx,
      "css" => FileType::Css,
      "html" | "htm" => FileType::Html,
      "json" => FileType::Json,
      "map" => FileType::Map,
      other => FileType::Other(other.to_string()),
    }
  }

  pub fn extension(&self) -> &str {
    match self {
      FileType::Js => "js",
      FileType::Jsx => "jsx",
      FileType::Ts => "ts",
      FileType::Tsx => "tsx",
      FileType::Css => "css",
      FileType::Html => "html",
      FileType::Json => "json",
      FileType::Map => "map",
      FileType::Other(extension) => extension,
    }
  }

  /// Whether assets of this type conventionally reference a source map.
  pub fn supports_source_maps(&self) -> bool {
    matches!(
      self,
      FileType::Js | FileType::Jsx | FileType::Ts | FileType::Tsx | FileType::Css
    )
  }
}

impl Serialize for FileType {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.extension().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for FileType {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let extension = String::deserialize(deserializer)?;
    Ok(FileType::from_extension(&extension))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_extensions_both_ways() {
    assert_eq!(FileType::from_extension("mjs"), FileType::Js);
    assert_eq!(FileType::from_extension("css").extension(), "css");
    assert_eq!(
      FileType::from_extension("txt"),
      FileType::Other("txt".to_string())
    );
    assert_eq!(FileType::Other("txt".to_string()).extension(), "txt");
  }

  #[test]
  fn source_map_support_follows_type() {
    assert!(FileType::Js.supports_source_maps());
    assert!(FileType::Css.supports_source_maps());
    assert!(!FileType::Json.supports_source_maps());
    assert!(!FileType::Other("txt".into()).supports_source_maps());
  }
}
