//! Loading seed objects from YAML manifests
use crate::unstructured::Unstructured;
use anyhow::Context as _;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Parses multi-document YAML. Empty documents are skipped.
/// Every document must set `apiVersion` and `kind`.
pub fn from_yaml(yaml: &str) -> anyhow::Result<Vec<Unstructured>> {
    let mut objects = Vec::new();
    for (idx, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = Value::deserialize(document)
            .with_context(|| format!("failed to parse document #{}", idx))?;
        if value.is_null() {
            continue;
        }
        let obj = Unstructured::from_value(value)
            .with_context(|| format!("document #{} is not a mapping", idx))?;
        if obj.api_version().is_empty() || obj.kind().is_empty() {
            anyhow::bail!("document #{} must set apiVersion and kind", idx);
        }
        objects.push(obj);
    }
    Ok(objects)
}

pub fn from_file(path: &Path) -> anyhow::Result<Vec<Unstructured>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_yaml(&data).with_context(|| format!("invalid manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_document() {
        let objects = from_yaml(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
  namespace: default
data:
  key: value
---
apiVersion: group/version
kind: TheKind
metadata:
  name: name-foo
"#,
        )
        .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name(), "cfg");
        assert_eq!(
            objects[0].nested_field(&["data", "key"]).and_then(|v| v.as_str()),
            Some("value")
        );
        assert_eq!(objects[1].kind(), "TheKind");
    }

    #[test]
    fn rejects_untyped_documents() {
        let err = from_yaml("metadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("apiVersion and kind"));
        assert!(from_yaml("- a\n- b\n").is_err());
    }
}
