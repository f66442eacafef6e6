//! Canonical JSON serialization and SHA-256 hashing over [`HashChainRecord`](crate::HashChainRecord)s.
//!
//! `canonical(v)` recursively sorts object keys by Unicode code-point order and
//! emits compact (whitespace-free) JSON. This is the exact byte string fed to
//! SHA-256 for every record's self-hash.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys and return the compact JSON bytes.
///
/// Arrays keep their natural order; only object keys are reordered. Numbers,
/// strings, and other scalars pass through `serde_json`'s own compact
/// formatting unchanged.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let sorted = sort_keys(value);
    serde_json::to_vec(&sorted).expect("canonicalized value is always serializable")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest of a string's bytes.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute `hash(r)` for any serializable record: canonicalize `r` with its
/// `hash` field removed, then SHA-256 hex the result.
///
/// Requires `r` to serialize to a JSON object containing a `"hash"` key (true
/// for every [`HashChainRecord`](crate::HashChainRecord)); returns an error
/// otherwise so callers never silently hash the wrong shape.
pub fn hash_of<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove("hash");
    }
    let canonical = canonical_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Recompute a record's hash over its current fields and compare to the
/// stored `hash`. Any serialization failure is treated as a verification
/// failure rather than propagated, since a record that fails to round-trip
/// through serde cannot have produced a trustworthy `hash` in the first place.
pub fn verify_self<T: Serialize>(record: &T) -> bool {
    let value = match serde_json::to_value(record) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let stored_hash = match value.get("hash").and_then(Value::as_str) {
        Some(h) => h.to_string(),
        None => return false,
    };
    match hash_of(record) {
        Ok(recomputed) => recomputed == stored_hash,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_object_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": 2, "y": 3}});
        let bytes = canonical_json(&value);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"y":3,"z":2},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_key_order_independent() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_canonical_json_preserves_array_order() {
        let value = json!({"xs": [3, 1, 2]});
        let bytes = canonical_json(&value);
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"xs":[3,1,2]}"#);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
