// =============================================================================
// Stable Hasher + JSON Canonicalizer (C5)
// =============================================================================
//
// `stable_stringify` renders a `serde_json::Value` with object keys sorted
// lexically and arrays left in original order; `null` is emitted for
// `Value::Null` but object entries whose value is `Value::Null` coming from
// an `Option::None` upstream are still written (only genuinely undefined
// fields — i.e. absent map keys — are elided, which `BTreeMap`/sorted-object
// iteration already guarantees since they were never inserted).
//
// Used anywhere a cache key, partition key or decision hash is required:
// feature-snapshot fingerprints (C9), AI decision-hash dedup (C10), sidecar
// config/snapshot hashes (C12).
// =============================================================================

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `v` as a canonical JSON string: object keys sorted, arrays ordered.
pub fn stable_stringify(v: &Value) -> String {
    let mut out = String::new();
    write_stable(v, &mut out);
    out
}

fn write_stable(v: &Value, out: &mut String) {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).unwrap_or_default());
                out.push(':');
                write_stable(&map[*k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// SHA-256 hex digest of `stable_stringify(v)`.
pub fn hash_stable_object(v: &Value) -> String {
    let s = stable_stringify(v);
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Combine two already-computed hex digests into one stable digest, used for
/// `decisionHash = hash(predictionHash ⊕ historyHash)` (C10).
pub fn combine_hashes(a: &str, b: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(a.as_bytes());
    hasher.update(b.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permuted_keys_hash_identically() {
        let a = json!({"b": 1, "a": 2, "c": {"y": 1, "x": 2}});
        let b = json!({"a": 2, "c": {"x": 2, "y": 1}, "b": 1});
        assert_eq!(hash_stable_object(&a), hash_stable_object(&b));
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn absent_keys_do_not_affect_hash() {
        let a = json!({"a": 1});
        let b = json!({"a": 1, "b": null});
        assert_ne!(hash_stable_object(&a), hash_stable_object(&b));
    }

    #[test]
    fn combine_hashes_is_deterministic() {
        let h1 = combine_hashes("aa", "bb");
        let h2 = combine_hashes("aa", "bb");
        assert_eq!(h1, h2);
        assert_ne!(h1, combine_hashes("bb", "aa"));
    }
}
