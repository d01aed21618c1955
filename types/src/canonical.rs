// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The canonical encoding everything signable is hashed over.
//!
//! Values are serialized to JSON with object keys in lexicographic order
//! (serde_json's default map is ordered), so the same logical record always
//! hashes to the same digest regardless of field insertion order.

use anyhow::Result;
use modulr_crypto::HashValue;
use serde::Serialize;

/// Deterministic JSON rendering of any serializable value.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    // Round-tripping through Value sorts map keys lexicographically.
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// Hash of the canonical rendering.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<HashValue> {
    Ok(HashValue::sha256_of(to_canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Wrapper {
        map: HashMap<String, u32>,
    }

    #[test]
    fn test_key_order_is_deterministic() {
        let mut a = HashMap::new();
        a.insert("zebra".to_string(), 1);
        a.insert("alpha".to_string(), 2);
        let mut b = HashMap::new();
        b.insert("alpha".to_string(), 2);
        b.insert("zebra".to_string(), 1);

        assert_eq!(
            to_canonical_json(&Wrapper { map: a }).unwrap(),
            to_canonical_json(&Wrapper { map: b }).unwrap(),
        );
    }

    #[test]
    fn test_keys_come_out_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), 0);
        map.insert("a".to_string(), 0);
        let json = to_canonical_json(&map).unwrap();
        assert_eq!(json, r#"{"a":0,"b":0}"#);
    }
}
