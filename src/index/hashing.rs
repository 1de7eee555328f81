//! Canonical value hashing shared by index maintenance and query evaluation.
//!
//! Index entries are keyed by the 64-bit hash of a value's canonical string
//! form. Both sides of the contract live here so the index builder and the
//! query evaluator can never disagree on how a value is rendered or hashed.

use serde_json::Value;

/// Reserved character joining path segments into an index name.
///
/// Attribute names containing this character cannot be indexed individually.
pub const PATH_SEP: &str = "!";

/// Joins path segments into the canonical index name.
pub fn join_path(segments: &[String]) -> String {
    segments.join(PATH_SEP)
}

/// Renders a JSON value in its canonical string form.
///
/// - strings are taken verbatim, without surrounding quotes
/// - integers render as plain decimal, floats via the shortest
///   round-trippable decimal
/// - booleans render as `true`/`false`, null as `null`
/// - arrays and objects fall back to their compact JSON serialization
pub fn canonical_str(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 64-bit sdbm string hash, the keying function for every hash index.
pub fn str_hash(s: &str) -> u64 {
    let mut hash: u64 = 0;
    for c in s.chars() {
        hash = (c as u64)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_scalars() {
        assert_eq!(canonical_str(&json!("alice")), "alice");
        assert_eq!(canonical_str(&json!(7)), "7");
        assert_eq!(canonical_str(&json!(-12)), "-12");
        assert_eq!(canonical_str(&json!(7.5)), "7.5");
        assert_eq!(canonical_str(&json!(true)), "true");
        assert_eq!(canonical_str(&json!(false)), "false");
        assert_eq!(canonical_str(&json!(null)), "null");
    }

    #[test]
    fn test_canonical_composites_are_compact_json() {
        assert_eq!(canonical_str(&json!([1, 2])), "[1,2]");
        assert_eq!(canonical_str(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_canonical_string_and_number_differ() {
        // "7" the string and 7 the number share a rendering, so both
        // land in the same index slot.
        assert_eq!(canonical_str(&json!("7")), canonical_str(&json!(7)));
    }

    #[test]
    fn test_str_hash_deterministic() {
        let h1 = str_hash("name!first");
        let h2 = str_hash("name!first");
        assert_eq!(h1, h2);
        assert_ne!(str_hash("a"), str_hash("b"));
    }

    #[test]
    fn test_str_hash_empty() {
        assert_eq!(str_hash(""), 0);
    }

    #[test]
    fn test_join_path() {
        let path = vec!["a".to_string(), "b".to_string()];
        assert_eq!(join_path(&path), "a!b");
        assert_eq!(join_path(&["solo".to_string()]), "solo");
    }
}
