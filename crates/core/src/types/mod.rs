mod asset;
mod ast;
mod dependency;
mod file_type;
mod symbol;

pub use asset::*;
pub use ast::*;
pub use dependency::*;
pub use file_type::*;
pub use symbol::*;

/// Arbitrary plugin metadata attached to assets and dependencies.
pub type JSONObject = serde_json::Map<String, serde_json::Value>;

/// Serializes bitflags as their raw bits so records survive worker transport
/// and the binary cache encoding.
#[macro_export]
macro_rules! bitflags_serde {
  ($t: ident, $repr: ty) => {
    impl serde::Serialize for $t {
      fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
      where
        S: serde::Serializer,
      {
        self.bits().serialize(serializer)
      }
    }

    impl<'de> serde::Deserialize<'de> for $t {
      fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
      where
        D: serde::Deserializer<'de>,
      {
        let bits = <$repr as serde::Deserialize>::deserialize(deserializer)?;
        Ok(<$t>::from_bits_truncate(bits))
      }
    }
  };
}
