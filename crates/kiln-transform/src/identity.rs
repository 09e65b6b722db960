//! Identity hashes for transformers.

use kiln_execution::{HashCode, Hasher};
use serde_json::Value;

/// Fingerprint of a transform implementation and its parameters.
///
/// Parameters are hashed in canonical form (object keys sorted, no
/// whitespace) so two equal parameter documents always hash the same.
pub struct IdentityHash;

impl IdentityHash {
  pub fn of(implementation: &str, params: &Value) -> HashCode {
    Hasher::new()
      .put_str(implementation)
      .put_str(&to_canonical_json(params))
      .finish()
  }
}

/// Serialize `value` with sorted object keys and no insignificant whitespace.
pub fn to_canonical_json(value: &Value) -> String {
  match value {
    Value::Array(items) => {
      let items: Vec<String> = items.iter().map(to_canonical_json).collect();
      format!("[{}]", items.join(","))
    }
    Value::Object(map) => {
      let mut entries: Vec<(&String, &Value)> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      let items: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), to_canonical_json(value)))
        .collect();
      format!("{{{}}}", items.join(","))
    }
    scalar => scalar.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_canonical_json_sorts_keys() {
    let value = json!({ "z": [ { "y": "yes" }, null ], "a": { "x": 10 } });
    assert_eq!(
      to_canonical_json(&value),
      "{\"a\":{\"x\":10},\"z\":[{\"y\":\"yes\"},null]}"
    );
  }

  #[test]
  fn test_identity_ignores_key_order() {
    let a = IdentityHash::of("copy", &json!({ "prefix": "p", "level": 3 }));
    let b = IdentityHash::of("copy", &json!({ "level": 3, "prefix": "p" }));
    assert_eq!(a, b);
  }

  #[test]
  fn test_identity_depends_on_name_and_params() {
    let base = IdentityHash::of("copy", &json!({}));
    assert_ne!(base, IdentityHash::of("checksum", &json!({})));
    assert_ne!(base, IdentityHash::of("copy", &json!({ "prefix": "p" })));
  }
}
