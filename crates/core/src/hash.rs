use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

/// 128-bit content digest, rendered as 32 hex characters.
pub fn hash_bytes(bytes: &[u8]) -> String {
  format!("{:032x}", xxh3_128(bytes))
}

pub fn hash_string(value: &str) -> String {
  hash_bytes(value.as_bytes())
}

/// Canonical serialization used for hashing structured values.
///
/// Values are routed through `serde_json::Value`, whose object representation
/// keeps keys sorted, so the output is independent of field insertion order.
pub fn canonical_json(value: &impl Serialize) -> Result<String, serde_json::Error> {
  serde_json::to_value(value).map(|value| value.to_string())
}

/// Deterministic digest of a serializable value.
pub fn hash_object(value: &impl Serialize) -> Result<String, serde_json::Error> {
  canonical_json(value).map(|json| hash_string(&json))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Serialize;

  #[derive(Serialize)]
  struct A {
    b: u32,
    a: u32,
  }

  #[derive(Serialize)]
  struct B {
    a: u32,
    b: u32,
  }

  #[test]
  fn canonical_json_sorts_object_keys() {
    let a = canonical_json(&A { b: 2, a: 1 }).unwrap();
    let b = canonical_json(&B { a: 1, b: 2 }).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, r#"{"a":1,"b":2}"#);
  }

  #[test]
  fn digests_are_stable() {
    assert_eq!(hash_string("hi"), hash_string("hi"));
    assert_ne!(hash_string("hi"), hash_string("ho"));
    assert_eq!(hash_bytes(b"hi").len(), 32);
  }
}
