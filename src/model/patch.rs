//! JSON merge patch (RFC 7386) used for partial draft updates.

use serde_json::Value;

/// Apply `patch` onto `target` in place.
///
/// Objects merge recursively, `null` removes a member, anything else replaces.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_rfc_examples() {
        let mut doc = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut doc, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(doc, json!({"a": "z", "c": {"d": "e"}}));

        let mut doc = json!({"a": ["b"]});
        merge_patch(&mut doc, &json!({"a": "c"}));
        assert_eq!(doc, json!({"a": "c"}));

        let mut doc = json!({"a": "foo"});
        merge_patch(&mut doc, &json!("bar"));
        assert_eq!(doc, json!("bar"));

        let mut doc = json!({"e": null});
        merge_patch(&mut doc, &json!({"a": 1}));
        assert_eq!(doc, json!({"e": null, "a": 1}));
    }

    #[test]
    fn test_merge_patch_replaces_arrays_wholesale() {
        let mut doc = json!({"clusters": ["c1", "c2"], "port": 80});
        merge_patch(&mut doc, &json!({"clusters": ["c3"]}));
        assert_eq!(doc, json!({"clusters": ["c3"], "port": 80}));
    }
}
