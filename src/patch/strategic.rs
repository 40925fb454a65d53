//! Strategic merge patch.
//!
//! Maps are merged recursively like in RFC 7386. Lists which have a merge key
//! are merged element by element, elements are matched by the value of that key.
//! Lists of primitives with merge strategy are merged as sets.
//! Other lists are replaced. Supported directives: `$patch` (`merge`, `replace`,
//! `delete`), `$retainKeys` and `$deleteFromPrimitiveList/<field>`.
//! `$setElementOrder/<field>` is accepted and ignored.

use crate::{
    errors::{Error, Result},
    scheme::MergeKeys,
};
use serde_json::{Map, Value};

const PATCH_DIRECTIVE: &str = "$patch";
const RETAIN_KEYS: &str = "$retainKeys";
const DELETE_FROM_PRIMITIVE_LIST: &str = "$deleteFromPrimitiveList/";
const SET_ELEMENT_ORDER: &str = "$setElementOrder/";

#[derive(Debug, PartialEq, Eq)]
enum Directive {
    Merge,
    Replace,
    Delete,
}

fn directive(patch: &Map<String, Value>) -> Result<Directive> {
    match patch.get(PATCH_DIRECTIVE) {
        None => Ok(Directive::Merge),
        Some(Value::String(s)) if s == "merge" => Ok(Directive::Merge),
        Some(Value::String(s)) if s == "replace" => Ok(Directive::Replace),
        Some(Value::String(s)) if s == "delete" => Ok(Directive::Delete),
        Some(other) => Err(Error::InvalidPatch(format!(
            "unknown patch directive: {}",
            other
        ))),
    }
}

fn is_directive_key(key: &str) -> bool {
    key.starts_with('$')
}

/// Copy of `value` as it should be stored: directive keys, null fields and
/// list elements marked for deletion are removed
fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, v)| !is_directive_key(k) && !v.is_null())
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !is_replace_marker(item) && !is_delete_marker(item))
                .map(strip_directives)
                .collect(),
        ),
        other => other.clone(),
    }
}

// `{"$patch": "replace"}` element inside a list
fn is_replace_marker(item: &Value) -> bool {
    match item.as_object() {
        Some(map) => map.len() == 1 && directive(map).ok() == Some(Directive::Replace),
        None => false,
    }
}

fn is_delete_marker(item: &Value) -> bool {
    match item.as_object() {
        Some(map) => directive(map).ok() == Some(Directive::Delete),
        None => false,
    }
}

pub(super) fn merge(target: &mut Value, patch: &Value, keys: &MergeKeys) -> Result<()> {
    let patch = match patch.as_object() {
        Some(p) => p,
        None => return Err(Error::InvalidPatch(super::INVALID_DOCUMENT.to_string())),
    };
    let mut path = Vec::new();
    merge_value_into(target, patch, &mut path, keys)
}

fn merge_value_into(
    target: &mut Value,
    patch: &Map<String, Value>,
    path: &mut Vec<String>,
    keys: &MergeKeys,
) -> Result<()> {
    match directive(patch)? {
        Directive::Replace => {
            *target = strip_directives(&Value::Object(patch.clone()));
            return Ok(());
        }
        Directive::Delete => {
            *target = Value::Object(Map::new());
            return Ok(());
        }
        Directive::Merge => (),
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        merge_map(map, patch, path, keys)?;
    }
    Ok(())
}

fn merge_map(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    path: &mut Vec<String>,
    keys: &MergeKeys,
) -> Result<()> {
    let mut retain: Option<Vec<String>> = None;
    for (key, value) in patch {
        if key == PATCH_DIRECTIVE || key.starts_with(SET_ELEMENT_ORDER) {
            continue;
        }
        if key == RETAIN_KEYS {
            let list = value.as_array().ok_or_else(|| {
                Error::InvalidPatch(format!("{} must be a list", RETAIN_KEYS))
            })?;
            retain = Some(
                list.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect(),
            );
            continue;
        }
        if let Some(field) = key.strip_prefix(DELETE_FROM_PRIMITIVE_LIST) {
            delete_from_primitive_list(target, field, value)?;
            continue;
        }

        path.push(key.clone());
        let res = merge_field(target, key, value, path, keys);
        path.pop();
        res?;
    }
    if let Some(retain) = retain {
        target.retain(|k, _| retain.contains(k));
    }
    Ok(())
}

fn merge_field(
    target: &mut Map<String, Value>,
    key: &str,
    value: &Value,
    path: &mut Vec<String>,
    keys: &MergeKeys,
) -> Result<()> {
    match value {
        Value::Null => {
            target.remove(key);
        }
        Value::Object(patch_map) => {
            if directive(patch_map)? == Directive::Delete {
                target.remove(key);
                return Ok(());
            }
            let slot = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            merge_value_into(slot, patch_map, path, keys)?;
        }
        Value::Array(patch_items) => match (keys.get(path), target.get_mut(key)) {
            (Some(merge_key), Some(Value::Array(items))) => {
                merge_list(items, patch_items, merge_key, path, keys)?;
            }
            (None, Some(Value::Array(items))) if keys.merges_primitives(path) => {
                union(items, patch_items);
            }
            _ => {
                target.insert(key.to_string(), strip_directives(value));
            }
        },
        scalar => {
            target.insert(key.to_string(), scalar.clone());
        }
    }
    Ok(())
}

fn merge_list(
    target: &mut Vec<Value>,
    patch: &[Value],
    merge_key: &str,
    path: &mut Vec<String>,
    keys: &MergeKeys,
) -> Result<()> {
    if patch.iter().any(is_replace_marker) {
        *target = patch
            .iter()
            .filter(|item| !is_replace_marker(item))
            .map(strip_directives)
            .collect();
        return Ok(());
    }
    for item in patch {
        let item_map = match item.as_object() {
            Some(m) => m,
            None => {
                union(target, std::slice::from_ref(item));
                continue;
            }
        };
        let id = item_map.get(merge_key).ok_or_else(|| {
            Error::InvalidPatch(format!(
                "map in list .{} does not contain merge key \"{}\"",
                path.join("."),
                merge_key
            ))
        })?;
        let existing = target
            .iter()
            .position(|t| t.get(merge_key) == Some(id));
        match (directive(item_map)?, existing) {
            (Directive::Delete, Some(idx)) => {
                target.remove(idx);
            }
            (Directive::Delete, None) => (),
            (_, Some(idx)) => merge_value_into(&mut target[idx], item_map, path, keys)?,
            (_, None) => target.push(strip_directives(item)),
        }
    }
    Ok(())
}

fn union(target: &mut Vec<Value>, patch: &[Value]) {
    for item in patch {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn delete_from_primitive_list(
    target: &mut Map<String, Value>,
    field: &str,
    values: &Value,
) -> Result<()> {
    let values = values.as_array().ok_or_else(|| {
        Error::InvalidPatch(format!(
            "{}{} must be a list",
            DELETE_FROM_PRIMITIVE_LIST, field
        ))
    })?;
    if let Some(Value::Array(items)) = target.get_mut(field) {
        items.retain(|item| !values.contains(item));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_keys() -> MergeKeys {
        let mut keys = MergeKeys::new();
        keys.insert("spec.containers", "name")
            .insert("spec.containers.env", "name")
            .insert("spec.volumes", "name")
            .insert_primitive("metadata.finalizers");
        keys
    }

    fn pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p", "finalizers": ["a", "b"]},
            "spec": {
                "containers": [
                    {"name": "app", "image": "app:1", "env": [{"name": "A", "value": "1"}]},
                    {"name": "sidecar", "image": "proxy:1"},
                ],
                "tolerations": [{"key": "x"}],
            }
        })
    }

    fn apply(patch: Value) -> Result<Value> {
        let mut doc = pod();
        merge(&mut doc, &patch, &pod_keys())?;
        Ok(doc)
    }

    #[test]
    fn merges_list_by_key() {
        let out = apply(json!({"spec": {"containers": [
            {"name": "app", "image": "app:2", "env": [{"name": "B", "value": "2"}]},
            {"name": "new", "image": "new:1"},
        ]}}))
        .unwrap();
        assert_eq!(
            out["spec"]["containers"],
            json!([
                {"name": "app", "image": "app:2", "env": [
                    {"name": "A", "value": "1"},
                    {"name": "B", "value": "2"},
                ]},
                {"name": "sidecar", "image": "proxy:1"},
                {"name": "new", "image": "new:1"},
            ])
        );
    }

    #[test]
    fn list_without_merge_key_is_replaced() {
        let out = apply(json!({"spec": {"tolerations": [{"key": "y"}]}})).unwrap();
        assert_eq!(out["spec"]["tolerations"], json!([{"key": "y"}]));
    }

    #[test]
    fn delete_directive_removes_element() {
        let out = apply(json!({"spec": {"containers": [
            {"name": "sidecar", "$patch": "delete"},
        ]}}))
        .unwrap();
        assert_eq!(out["spec"]["containers"].as_array().unwrap().len(), 1);
        assert_eq!(out["spec"]["containers"][0]["name"], "app");
    }

    #[test]
    fn replace_directive_on_list_and_map() {
        let out = apply(json!({"spec": {"containers": [
            {"$patch": "replace"},
            {"name": "only", "image": "only:1"},
        ]}}))
        .unwrap();
        assert_eq!(
            out["spec"]["containers"],
            json!([{"name": "only", "image": "only:1"}])
        );

        let out = apply(json!({"metadata": {"$patch": "replace", "name": "q"}})).unwrap();
        assert_eq!(out["metadata"], json!({"name": "q"}));
    }

    #[test]
    fn primitive_list_deletion_and_retain_keys() {
        let out = apply(json!({
            "metadata": {"$deleteFromPrimitiveList/finalizers": ["a"]},
            "spec": {"$retainKeys": ["containers"], "tolerations": null},
        }))
        .unwrap();
        assert_eq!(out["metadata"]["finalizers"], json!(["b"]));
        assert!(out["spec"].get("tolerations").is_none());
        assert!(out["spec"].get("containers").is_some());
    }

    #[test]
    fn delete_directive_never_creates_element() {
        let out = apply(json!({"spec": {
            "volumes": [{"name": "v", "$patch": "delete"}],
            "tolerations": [{"key": "y"}, {"key": "z", "$patch": "delete"}],
        }}))
        .unwrap();
        assert_eq!(out["spec"]["volumes"], json!([]));
        assert_eq!(out["spec"]["tolerations"], json!([{"key": "y"}]));
    }

    #[test]
    fn primitive_list_with_merge_strategy_is_unioned() {
        let out = apply(json!({"metadata": {"finalizers": ["b", "c"]}})).unwrap();
        assert_eq!(out["metadata"]["finalizers"], json!(["a", "b", "c"]));

        let mut doc = pod();
        merge(
            &mut doc,
            &json!({"metadata": {"finalizers": ["c"]}}),
            &MergeKeys::new(),
        )
        .unwrap();
        assert_eq!(doc["metadata"]["finalizers"], json!(["c"]));
    }

    #[test]
    fn new_elements_drop_null_fields() {
        let out = apply(json!({"spec": {"containers": [
            {"name": "new", "image": "new:1", "command": null, "resources": {"limits": null}},
        ]}}))
        .unwrap();
        assert_eq!(
            out["spec"]["containers"][2],
            json!({"name": "new", "image": "new:1", "resources": {}})
        );
    }

    #[test]
    fn missing_merge_key_is_an_error() {
        let err = apply(json!({"spec": {"containers": [{"image": "x"}]}})).unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let err = apply(json!({"spec": {"$patch": "explode"}})).unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
    }
}
