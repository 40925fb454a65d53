//! Schemaless objects

use crate::{
    errors::{Error, Result},
    gvk::GroupVersionKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Self-describing document: `apiVersion`, `kind`, `metadata` and
/// arbitrary other fields. Always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Unstructured(Value);

impl Default for Unstructured {
    fn default() -> Self {
        Unstructured(Value::Object(Map::new()))
    }
}

impl Unstructured {
    pub fn new(api_version: &str, kind: &str) -> Self {
        let mut obj = Map::new();
        obj.insert("apiVersion".to_string(), api_version.into());
        obj.insert("kind".to_string(), kind.into());
        Unstructured(Value::Object(obj))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Invalid(format!(
                "expected a JSON object, got {}",
                value_type(&value)
            )));
        }
        Ok(Unstructured(value))
    }

    /// Converts typed object. `apiVersion` and `kind` are taken from the type.
    pub fn from_typed<K: k8s_openapi::Resource + Serialize>(obj: &K) -> Result<Self> {
        let value =
            serde_json::to_value(obj).map_err(|err| Error::Invalid(err.to_string()))?;
        let mut u = Unstructured::from_value(value)?;
        u.set_field("apiVersion", K::API_VERSION.into());
        u.set_field("kind", K::KIND.into());
        Ok(u)
    }

    /// Decodes this object into a typed representation.
    pub fn decode<K: serde::de::DeserializeOwned>(&self) -> Result<K> {
        serde_json::from_value(self.0.clone()).map_err(|err| Error::Invalid(err.to_string()))
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.set_name(name);
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.set_namespace(namespace);
        self
    }

    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.set_field(field, value);
        self
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn object(&self) -> &Map<String, Value> {
        self.0
            .as_object()
            .expect("Unstructured always wraps an object")
    }

    fn object_mut(&mut self) -> &mut Map<String, Value> {
        self.0
            .as_object_mut()
            .expect("Unstructured always wraps an object")
    }

    fn str_field(&self, path: &[&str]) -> &str {
        self.nested_field(path).and_then(Value::as_str).unwrap_or("")
    }

    pub fn api_version(&self) -> &str {
        self.str_field(&["apiVersion"])
    }

    pub fn kind(&self) -> &str {
        self.str_field(&["kind"])
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(self.api_version(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.str_field(&["metadata", "name"])
    }

    /// Empty for cluster-scoped objects
    pub fn namespace(&self) -> &str {
        self.str_field(&["metadata", "namespace"])
    }

    pub fn resource_version(&self) -> &str {
        self.str_field(&["metadata", "resourceVersion"])
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_metadata_field("name", name.into());
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.set_metadata_field("namespace", namespace.into());
    }

    pub fn set_resource_version(&mut self, resource_version: &str) {
        self.set_metadata_field("resourceVersion", resource_version.into());
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "labels"])
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map(&["metadata", "annotations"])
    }

    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        let labels = labels.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        self.set_metadata_field("labels", Value::Object(labels));
    }

    fn string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        match self.nested_field(path).and_then(Value::as_object) {
            Some(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            None => BTreeMap::new(),
        }
    }

    fn set_metadata_field(&mut self, field: &str, value: Value) {
        let metadata = self
            .object_mut()
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert(field.to_string(), value);
        }
    }

    fn set_field(&mut self, field: &str, value: Value) {
        self.object_mut().insert(field.to_string(), value);
    }

    /// Returns field addressed by `path`, if every intermediate value is an object.
    pub fn nested_field(&self, path: &[&str]) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in path {
            cur = cur.as_object()?.get(*segment)?;
        }
        Some(cur)
    }

    /// Sets field addressed by `path`, creating missing intermediate objects.
    /// Fails if an intermediate value exists but is not an object.
    pub fn set_nested_field(&mut self, path: &[&str], value: Value) -> Result<()> {
        let (last, parents) = match path.split_last() {
            Some(split) => split,
            None => {
                let u = Unstructured::from_value(value)?;
                *self = u;
                return Ok(());
            }
        };
        let mut cur = self.object_mut();
        for (depth, segment) in parents.iter().enumerate() {
            let next = cur
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            cur = match next {
                Value::Object(map) => map,
                other => {
                    return Err(Error::Invalid(format!(
                        "value at .{} is {}, not an object",
                        path[..=depth].join("."),
                        value_type(other)
                    )))
                }
            };
        }
        cur.insert(last.to_string(), value);
        Ok(())
    }

    /// Removes field addressed by `path`, returning previous value.
    pub fn remove_nested_field(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut cur = self.object_mut();
        for segment in parents {
            cur = cur.get_mut(*segment)?.as_object_mut()?;
        }
        cur.remove(*last)
    }

    /// True for collection documents (`FooList` with `items`).
    pub fn is_list(&self) -> bool {
        self.kind().ends_with("List") && self.object().get("items").map_or(false, Value::is_array)
    }

    /// Splits collection document into its items.
    /// Items missing `apiVersion` or `kind` inherit the item kind of the list.
    pub fn into_items(self) -> Result<Vec<Unstructured>> {
        let api_version = self.api_version().to_string();
        let item_kind = self.kind().trim_end_matches("List").to_string();
        let items = match self.0 {
            Value::Object(mut obj) => obj.remove("items"),
            _ => None,
        };
        let items = match items {
            Some(Value::Array(items)) => items,
            _ => return Ok(Vec::new()),
        };
        items
            .into_iter()
            .map(|item| {
                let mut item = Unstructured::from_value(item)?;
                if item.api_version().is_empty() {
                    item.set_field("apiVersion", api_version.clone().into());
                }
                if item.kind().is_empty() {
                    item.set_field("kind", item_kind.clone().into());
                }
                Ok(item)
            })
            .collect()
    }
}

impl From<Unstructured> for Value {
    fn from(u: Unstructured) -> Value {
        u.0
    }
}

impl std::convert::TryFrom<Value> for Unstructured {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Unstructured::from_value(value)
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(rename = "continue")]
    pub continue_: String,
    pub resource_version: String,
}

/// Collection document returned by list calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstructuredList {
    pub api_version: String,
    pub kind: String,
    pub metadata: ListMeta,
    pub items: Vec<Unstructured>,
}

impl UnstructuredList {
    pub fn new(api_version: &str, kind: &str) -> Self {
        UnstructuredList {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(&self.api_version, &self.kind)
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(Unstructured::name).collect()
    }
}
