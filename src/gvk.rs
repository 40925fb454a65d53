//! Resource and kind identities

use crate::errors::Error;
use std::{fmt, str::FromStr};

/// Identifies a family of resources served under one URL path segment,
/// e.g. `apps/v1/deployments`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        GroupVersionResource {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// `group/version`, or bare `version` for the core group
    pub fn api_version(&self) -> String {
        join_api_version(&self.group, &self.version)
    }

    pub fn with_kind(&self, kind: &str) -> GroupVersionKind {
        GroupVersionKind::new(&self.group, &self.version, kind)
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Parses `group/version/resource`, or `version/resource` for the core group.
impl FromStr for GroupVersionResource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (api_version, resource) = s
            .rsplit_once('/')
            .filter(|(av, r)| !av.is_empty() && !r.is_empty())
            .ok_or_else(|| {
                Error::BadRequest(format!("expected group/version/resource, got \"{}\"", s))
            })?;
        let (group, version) = split_api_version(api_version);
        Ok(GroupVersionResource::new(group, version, resource))
    }
}

impl From<&kube::core::ApiResource> for GroupVersionResource {
    fn from(ar: &kube::core::ApiResource) -> Self {
        GroupVersionResource::new(&ar.group, &ar.version, &ar.plural)
    }
}

/// Identifies a schema, e.g. `apps/v1, Kind=Deployment`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Builds kind identity from `apiVersion` and `kind` fields of a document.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        GroupVersionKind::new(group, version, kind)
    }

    /// Identity of a statically known k8s-openapi type.
    pub fn of<K: k8s_openapi::Resource>() -> Self {
        GroupVersionKind::new(K::GROUP, K::VERSION, K::KIND)
    }

    pub fn api_version(&self) -> String {
        join_api_version(&self.group, &self.version)
    }

    pub fn with_resource(&self, resource: &str) -> GroupVersionResource {
        GroupVersionResource::new(&self.group, &self.version, resource)
    }

    /// Guesses resource identity using [`guess_plural`].
    pub fn guess_resource(&self) -> GroupVersionResource {
        self.with_resource(&guess_plural(&self.kind))
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

impl From<&kube::core::ApiResource> for GroupVersionKind {
    fn from(ar: &kube::core::ApiResource) -> Self {
        GroupVersionKind::new(&ar.group, &ar.version, &ar.kind)
    }
}

/// Splits `apiVersion` into group and version.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

fn join_api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}

/// Derives resource name from kind: lowercase and pluralize.
/// It is only a heuristic, irregular plurals must be registered
/// in the [`Scheme`](crate::Scheme).
pub fn guess_plural(kind: &str) -> String {
    let singular = kind.to_lowercase();
    if singular.ends_with("endpoints") {
        return singular;
    }
    if singular.ends_with('s') {
        return format!("{}es", singular);
    }
    if let Some(stem) = singular.strip_suffix('y') {
        let vowel_before = stem
            .chars()
            .last()
            .map_or(false, |c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
        if !vowel_before {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", singular)
}
