//! Patch engine: applies raw patch bodies to serialized objects.
mod strategic;

use crate::{
    errors::{Error, Result},
    scheme::MergeKeys,
};
use serde_json::Value;
use std::str::FromStr;

/// Message of the error returned when a merge-style patch body is not a JSON object.
pub const INVALID_DOCUMENT: &str = "invalid JSON document";

/// Patch kinds, identified by their content types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr,
)]
pub enum PatchType {
    /// RFC 6902
    #[strum(serialize = "application/json-patch+json")]
    JsonPatch,
    /// RFC 7386
    #[strum(serialize = "application/merge-patch+json")]
    MergePatch,
    #[strum(serialize = "application/strategic-merge-patch+json")]
    StrategicMergePatch,
    /// Server-side apply. Recognized, but not supported by the fake store.
    #[strum(serialize = "application/apply-patch+yaml")]
    Apply,
}

impl PatchType {
    /// Parses content type. Unknown types are reported as unsupported.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        PatchType::from_str(content_type)
            .map_err(|_| Error::UnsupportedPatchType(content_type.to_string()))
    }
}

/// One way of applying a patch body to a document
pub trait PatchStrategy {
    fn apply(&self, target: &Value, patch: &[u8]) -> Result<Value>;
}

/// RFC 6902 operations list
pub struct JsonPatch;

impl PatchStrategy for JsonPatch {
    fn apply(&self, target: &Value, patch: &[u8]) -> Result<Value> {
        let ops: json_patch::Patch = serde_json::from_slice(patch)
            .map_err(|err| Error::InvalidPatch(format!("invalid JSON patch: {}", err)))?;
        let mut doc = target.clone();
        json_patch::patch(&mut doc, &ops).map_err(|err| Error::InvalidPatch(err.to_string()))?;
        Ok(doc)
    }
}

/// RFC 7386 partial document
pub struct MergePatch;

impl PatchStrategy for MergePatch {
    fn apply(&self, target: &Value, patch: &[u8]) -> Result<Value> {
        let patch = parse_document(patch)?;
        let mut doc = target.clone();
        json_patch::merge(&mut doc, &patch);
        Ok(doc)
    }
}

/// Merge patch which merges list elements by identity.
/// Without merge keys it behaves like [`MergePatch`].
pub struct StrategicMergePatch<'a> {
    pub merge_keys: Option<&'a MergeKeys>,
}

impl PatchStrategy for StrategicMergePatch<'_> {
    fn apply(&self, target: &Value, patch: &[u8]) -> Result<Value> {
        let keys = match self.merge_keys {
            Some(keys) => keys,
            None => return MergePatch.apply(target, patch),
        };
        let patch = parse_document(patch)?;
        let mut doc = target.clone();
        strategic::merge(&mut doc, &patch, keys)?;
        Ok(doc)
    }
}

fn parse_document(raw: &[u8]) -> Result<Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(doc @ Value::Object(_)) => Ok(doc),
        _ => Err(Error::InvalidPatch(INVALID_DOCUMENT.to_string())),
    }
}

/// Applies `patch` to `target` using the strategy selected by `patch_type`.
/// `merge_keys` is the type information for strategic merge; `None` means
/// the target kind is unknown.
pub fn apply_patch(
    patch_type: PatchType,
    target: &Value,
    patch: &[u8],
    merge_keys: Option<&MergeKeys>,
) -> Result<Value> {
    let strategy: Box<dyn PatchStrategy + '_> = match patch_type {
        PatchType::JsonPatch => Box::new(JsonPatch),
        PatchType::MergePatch => Box::new(MergePatch),
        PatchType::StrategicMergePatch => Box::new(StrategicMergePatch { merge_keys }),
        PatchType::Apply => return Err(Error::UnsupportedPatchType(patch_type.to_string())),
    };
    strategy.apply(target, patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Value {
        json!({
            "apiVersion": "testgroup/testversion",
            "kind": "TestKind",
            "metadata": {"name": "testname", "namespace": "testns"},
            "spec": {"foo": "bar", "toremove": "x"},
        })
    }

    #[test]
    fn content_types() {
        assert_eq!(
            PatchType::from_content_type("application/merge-patch+json").unwrap(),
            PatchType::MergePatch
        );
        assert_eq!(
            PatchType::StrategicMergePatch.to_string(),
            "application/strategic-merge-patch+json"
        );
        assert!(matches!(
            PatchType::from_content_type("text/plain"),
            Err(Error::UnsupportedPatchType(_))
        ));
    }

    #[test]
    fn json_patch_ops() {
        let out = apply_patch(
            PatchType::JsonPatch,
            &target(),
            br#"[{"op": "test", "path": "/spec/foo", "value": "bar"},
                 {"op": "remove", "path": "/spec/toremove"},
                 {"op": "add", "path": "/spec/list", "value": []},
                 {"op": "add", "path": "/spec/list/-", "value": 1}]"#,
            None,
        )
        .unwrap();
        assert_eq!(out["spec"], json!({"foo": "bar", "list": [1]}));
    }

    #[test]
    fn json_patch_on_missing_path_fails() {
        let err = apply_patch(
            PatchType::JsonPatch,
            &target(),
            br#"[{"op": "replace", "path": "/spec/missing", "value": 1}]"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
    }

    #[test]
    fn json_patch_rejects_document_body() {
        let err = apply_patch(PatchType::JsonPatch, &target(), br#"{"spec": {}}"#, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
    }

    #[test]
    fn merge_patch_deletes_nulls() {
        let out = apply_patch(
            PatchType::MergePatch,
            &target(),
            br#"{"spec": {"toremove": null, "new": {"a": 1}}}"#,
            None,
        )
        .unwrap();
        assert_eq!(out["spec"], json!({"foo": "bar", "new": {"a": 1}}));
    }

    #[test]
    fn array_body_is_not_a_document() {
        for pt in &[PatchType::MergePatch, PatchType::StrategicMergePatch] {
            let err = apply_patch(*pt, &target(), b"[]", None).unwrap_err();
            assert_eq!(err.to_string(), INVALID_DOCUMENT);
            let keys = MergeKeys::new();
            let err = apply_patch(*pt, &target(), b"[]", Some(&keys)).unwrap_err();
            assert_eq!(err.to_string(), INVALID_DOCUMENT);
        }
    }

    #[test]
    fn apply_is_unsupported() {
        let err = apply_patch(PatchType::Apply, &target(), b"{}", None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPatchType(_)));
    }
}
