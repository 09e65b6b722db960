//! Content hashes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit blake3 content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashCode([u8; 32]);

impl HashCode {
  pub fn of_bytes(bytes: &[u8]) -> Self {
    Self(*blake3::hash(bytes).as_bytes())
  }

  pub fn of_str(value: &str) -> Self {
    Self::of_bytes(value.as_bytes())
  }

  pub fn from_hex(hex: &str) -> Option<Self> {
    blake3::Hash::from_hex(hex).ok().map(|h| Self(*h.as_bytes()))
  }

  pub fn to_hex(&self) -> String {
    blake3::Hash::from(self.0).to_hex().to_string()
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl From<blake3::Hash> for HashCode {
  fn from(hash: blake3::Hash) -> Self {
    Self(*hash.as_bytes())
  }
}

impl fmt::Display for HashCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl fmt::Debug for HashCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "HashCode({})", &self.to_hex()[..16])
  }
}

impl Serialize for HashCode {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_hex())
  }
}

impl<'de> Deserialize<'de> for HashCode {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let hex = String::deserialize(deserializer)?;
    HashCode::from_hex(&hex)
      .ok_or_else(|| serde::de::Error::custom(format!("invalid hash code: {}", hex)))
  }
}

/// Incrementally combines values into a [`HashCode`].
///
/// Strings and byte slices are length-prefixed so that adjacent values cannot
/// run into each other (`"ab" + "c"` hashes differently from `"a" + "bc"`).
pub struct Hasher {
  inner: blake3::Hasher,
}

impl Hasher {
  pub fn new() -> Self {
    Self {
      inner: blake3::Hasher::new(),
    }
  }

  pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
    self.inner.update(&(bytes.len() as u64).to_le_bytes());
    self.inner.update(bytes);
    self
  }

  pub fn put_str(&mut self, value: &str) -> &mut Self {
    self.put_bytes(value.as_bytes())
  }

  pub fn put_hash(&mut self, hash: &HashCode) -> &mut Self {
    self.inner.update(hash.as_bytes());
    self
  }

  pub fn finish(&self) -> HashCode {
    self.inner.finalize().into()
  }
}

impl Default for Hasher {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hex_round_trip() {
    let hash = HashCode::of_str("kiln");
    let hex = hash.to_hex();
    assert_eq!(hex.len(), 64);
    assert_eq!(HashCode::from_hex(&hex), Some(hash));
    assert_eq!(hash.to_string(), hex);
  }

  #[test]
  fn test_invalid_hex() {
    assert!(HashCode::from_hex("not-a-hash").is_none());
  }

  #[test]
  fn test_hasher_is_length_prefixed() {
    let a = Hasher::new().put_str("ab").put_str("c").finish();
    let b = Hasher::new().put_str("a").put_str("bc").finish();
    assert_ne!(a, b);
  }

  #[test]
  fn test_serde_as_hex_string() {
    let hash = HashCode::of_str("x");
    let json = serde_json::to_string(&hash).unwrap();
    assert_eq!(json, format!("\"{}\"", hash.to_hex()));
    let back: HashCode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, hash);
  }
}
