//! Order-invariant hashing of extracted join keys.

use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hashes an extracted field map into a join key.
///
/// The hash is a pure function of the map contents: entries are sorted by
/// field name before hashing, so two events whose expressions ran in
/// different order still land on the same field set. Each name and compact
/// JSON value is framed by its byte length, keeping adjacent pairs from
/// colliding after concatenation.
#[must_use]
pub fn field_set_hash(fields: &IndexMap<String, Value>) -> String {
    let mut pairs: Vec<(&str, String)> = fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.to_string()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, value) in &pairs {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn insertion_order_does_not_change_the_hash() {
        let forward = map(&[("a", json!(1)), ("b", json!("x"))]);
        let backward = map(&[("b", json!("x")), ("a", json!(1))]);
        assert_eq!(field_set_hash(&forward), field_set_hash(&backward));
    }

    #[test]
    fn values_change_the_hash() {
        let one = map(&[("version", json!("v1"))]);
        let two = map(&[("version", json!("v2"))]);
        assert_ne!(field_set_hash(&one), field_set_hash(&two));
    }

    #[test]
    fn names_change_the_hash() {
        let one = map(&[("version", json!("v1"))]);
        let two = map(&[("release", json!("v1"))]);
        assert_ne!(field_set_hash(&one), field_set_hash(&two));
    }

    #[test]
    fn length_framing_separates_shifted_pairs() {
        // Without framing both would hash the bytes `ab"c"`.
        let one = map(&[("ab", json!("c"))]);
        let two = map(&[("a", json!("bc"))]);
        assert_ne!(field_set_hash(&one), field_set_hash(&two));
    }

    #[test]
    fn value_type_matters() {
        let number = map(&[("key", json!(1))]);
        let string = map(&[("key", json!("1"))]);
        assert_ne!(field_set_hash(&number), field_set_hash(&string));
    }

    #[test]
    fn hash_is_hex_encoded_sha256() {
        let hash = field_set_hash(&map(&[("a", json!(1))]));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn any_permutation_hashes_identically(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..6)
        ) {
            let forward: IndexMap<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            let backward: IndexMap<String, Value> = entries
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            prop_assert_eq!(field_set_hash(&forward), field_set_hash(&backward));
        }
    }
}
