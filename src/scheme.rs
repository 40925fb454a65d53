//! Type registry.
//!
//! Scheme tells the store which kinds are known, how their resources are named,
//! which collection kind belongs to which resource and how list fields should
//! be merged by strategic merge patches. An empty scheme is valid: everything
//! then falls back to schemaless behavior.

use crate::{
    errors::{Error, Result},
    gvk::{guess_plural, GroupVersionKind, GroupVersionResource},
    unstructured::Unstructured,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

type Validator = fn(&Value) -> std::result::Result<(), serde_json::Error>;

fn decodes_as<K: DeserializeOwned>(value: &Value) -> std::result::Result<(), serde_json::Error> {
    <K as serde::Deserialize>::deserialize(value).map(drop)
}

/// Merge strategy of list fields, keyed by dotted field path
/// (list elements do not add path segments, e.g. `spec.containers.ports`).
///
/// Lists of maps are merged by a merge key. Lists of primitives registered
/// with `insert_primitive` are merged as sets. All other lists are replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeKeys {
    keys: BTreeMap<String, String>,
    primitives: BTreeSet<String>,
}

impl MergeKeys {
    pub fn new() -> Self {
        MergeKeys::default()
    }

    pub fn insert(&mut self, path: &str, key: &str) -> &mut Self {
        self.keys.insert(path.to_string(), key.to_string());
        self
    }

    /// Marks a list of primitives as merged instead of replaced
    pub fn insert_primitive(&mut self, path: &str) -> &mut Self {
        self.primitives.insert(path.to_string());
        self
    }

    pub fn get(&self, path: &[String]) -> Option<&str> {
        self.keys.get(&path.join(".")).map(String::as_str)
    }

    pub fn merges_primitives(&self, path: &[String]) -> bool {
        self.primitives.contains(&path.join("."))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.primitives.is_empty()
    }
}

/// Everything the scheme knows about one kind
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub gvk: GroupVersionKind,
    /// Resource name, e.g. `deployments`
    pub plural: String,
    pub merge_keys: MergeKeys,
    validator: Option<Validator>,
}

impl TypeInfo {
    /// Kind without schema: only its identity and guessed plural are known.
    pub fn new(gvk: GroupVersionKind) -> Self {
        let plural = guess_plural(&gvk.kind);
        TypeInfo {
            gvk,
            plural,
            merge_keys: MergeKeys::new(),
            validator: None,
        }
    }

    pub fn with_plural(mut self, plural: &str) -> Self {
        self.plural = plural.to_string();
        self
    }

    pub fn with_merge_key(mut self, path: &str, key: &str) -> Self {
        self.merge_keys.insert(path, key);
        self
    }

    pub fn with_merged_primitive_list(mut self, path: &str) -> Self {
        self.merge_keys.insert_primitive(path);
        self
    }

    /// Objects of this kind must decode into `K`.
    pub fn decodable_as<K: DeserializeOwned>(mut self) -> Self {
        self.validator = Some(decodes_as::<K>);
        self
    }

    pub fn resource(&self) -> GroupVersionResource {
        self.gvk.with_resource(&self.plural)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheme {
    types: BTreeMap<GroupVersionKind, TypeInfo>,
}

impl Scheme {
    pub fn new() -> Self {
        Scheme::default()
    }

    /// Scheme with the most common built-in k8s-openapi types registered.
    pub fn with_builtin_types() -> Self {
        use k8s_openapi::api::{
            apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
            batch::v1::Job,
            core::v1::{ConfigMap, Namespace, Node, Pod, Secret, Service, ServiceAccount},
        };
        let mut scheme = Scheme::new();
        scheme
            .register::<Pod>()
            .register::<ConfigMap>()
            .register::<Secret>()
            .register::<Service>()
            .register::<ServiceAccount>()
            .register::<Namespace>()
            .register::<Node>()
            .register::<Deployment>()
            .register::<StatefulSet>()
            .register::<DaemonSet>()
            .register::<ReplicaSet>()
            .register::<Job>();
        scheme
    }

    pub fn add_known_type(&mut self, info: TypeInfo) -> &mut Self {
        tracing::trace!(gvk = %info.gvk, plural = info.plural.as_str(), "registering type");
        self.types.insert(info.gvk.clone(), info);
        self
    }

    /// Registers a kind without any schema information
    pub fn add_known_type_with_name(&mut self, gvk: GroupVersionKind) -> &mut Self {
        self.add_known_type(TypeInfo::new(gvk))
    }

    /// Registers k8s-openapi type together with its list type.
    pub fn register<K>(&mut self) -> &mut Self
    where
        K: k8s_openapi::Resource + k8s_openapi::ListableResource + DeserializeOwned,
    {
        let gvk = GroupVersionKind::of::<K>();
        let mut info = TypeInfo::new(gvk.clone())
            .with_plural(K::URL_PATH_SEGMENT)
            .decodable_as::<K>();
        for (path, key) in well_known_merge_keys(K::KIND) {
            info.merge_keys.insert(&path, key);
        }
        for path in MERGED_PRIMITIVE_LISTS {
            info.merge_keys.insert_primitive(path);
        }
        self.add_known_type(info);
        let list_gvk = GroupVersionKind::new(&gvk.group, &gvk.version, K::LIST_KIND);
        self.add_known_type_with_name(list_gvk)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.types.contains_key(gvk)
    }

    pub fn type_info(&self, gvk: &GroupVersionKind) -> Option<&TypeInfo> {
        self.types.get(gvk)
    }

    /// Resource serving given kind. Registered plural wins over the heuristic.
    pub fn resource_for(&self, gvk: &GroupVersionKind) -> GroupVersionResource {
        match self.types.get(gvk) {
            Some(info) => info.resource(),
            None => gvk.guess_resource(),
        }
    }

    /// Finds registered `<Kind>List` type whose item kind is served by `gvr`.
    pub fn list_kind_for(&self, gvr: &GroupVersionResource) -> Option<String> {
        self.types
            .keys()
            .filter(|gvk| gvk.group == gvr.group && gvk.version == gvr.version)
            .find_map(|list_gvk| {
                let item_kind = list_gvk.kind.strip_suffix("List")?;
                let item_gvk = GroupVersionKind::new(&gvr.group, &gvr.version, item_kind);
                if self.resource_for(&item_gvk) == *gvr {
                    Some(list_gvk.kind.clone())
                } else {
                    None
                }
            })
    }

    /// Kind served by `gvr`, if some registered type maps to it.
    pub fn kind_for(&self, gvr: &GroupVersionResource) -> Option<String> {
        self.types
            .values()
            .find(|info| info.resource() == *gvr)
            .map(|info| info.gvk.kind.clone())
    }

    pub fn merge_keys(&self, gvk: &GroupVersionKind) -> Option<&MergeKeys> {
        self.types.get(gvk).map(|info| &info.merge_keys)
    }

    /// Checks that object decodes into its registered type.
    /// Unregistered kinds and kinds without schema always pass.
    pub fn validate(&self, obj: &Unstructured) -> Result<()> {
        let gvk = obj.gvk();
        let validator = match self.types.get(&gvk).and_then(|info| info.validator) {
            Some(v) => v,
            None => return Ok(()),
        };
        validator(obj.as_value()).map_err(|err| {
            Error::Invalid(format!(
                "{} \"{}\" does not match its schema: {}",
                gvk,
                obj.name(),
                err
            ))
        })
    }
}

// object metadata shared by every built-in kind
const MERGED_PRIMITIVE_LISTS: &[&str] = &["metadata.finalizers"];

const POD_SPEC_MERGE_KEYS: &[(&str, &str)] = &[
    ("containers", "name"),
    ("containers.ports", "containerPort"),
    ("containers.env", "name"),
    ("containers.volumeMounts", "mountPath"),
    ("initContainers", "name"),
    ("initContainers.env", "name"),
    ("initContainers.volumeMounts", "mountPath"),
    ("ephemeralContainers", "name"),
    ("volumes", "name"),
    ("imagePullSecrets", "name"),
];

fn well_known_merge_keys(kind: &str) -> Vec<(String, &'static str)> {
    let mut keys = vec![("metadata.ownerReferences".to_string(), "uid")];
    let pod_spec_prefix = match kind {
        "Pod" => Some("spec"),
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Job" => {
            Some("spec.template.spec")
        }
        _ => None,
    };
    if let Some(prefix) = pod_spec_prefix {
        keys.extend(
            POD_SPEC_MERGE_KEYS
                .iter()
                .map(|(path, key)| (format!("{}.{}", prefix, path), *key)),
        );
    }
    match kind {
        "Service" => keys.push(("spec.ports".to_string(), "port")),
        "Node" => keys.push(("status.addresses".to_string(), "type")),
        _ => (),
    }
    if kind != "ConfigMap" && kind != "Secret" && kind != "ServiceAccount" {
        keys.push(("status.conditions".to_string(), "type"));
    }
    keys
}
