//! Object tracker: the storage behind the fake client.
//!
//! Objects are kept per resource, keyed by `(namespace, name)`. Every
//! operation takes the tracker lock once and holds it for its whole
//! read-modify-write, so no caller can observe a half-applied change.
//! Reads hand out copies.

use crate::{
    errors::{Error, Result},
    gvk::GroupVersionResource,
    params::ListOptions,
    patch::{apply_patch, PatchType},
    scheme::Scheme,
    selector::{FieldSelector, LabelSelector},
    unstructured::{Unstructured, UnstructuredList},
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// `(namespace, name)`; ordering of this key is the ordering of list results
type ObjectKey = (String, String);

/// Explicit list kinds, e.g. `group/version/thekinds` => `TheKindList`
pub type ListKinds = BTreeMap<GroupVersionResource, String>;

/// Where a write goes and whether it should be persisted
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteParams<'a> {
    /// Empty for the main resource
    pub subresource: &'a str,
    /// Validate everything, persist nothing
    pub dry_run: bool,
}

impl<'a> WriteParams<'a> {
    pub fn subresource(subresource: &'a str) -> Self {
        WriteParams {
            subresource,
            dry_run: false,
        }
    }
}

#[derive(Default)]
struct TrackerState {
    objects: BTreeMap<GroupVersionResource, BTreeMap<ObjectKey, Unstructured>>,
    /// Singular kind last seen for each resource, used to name lists
    kinds: BTreeMap<GroupVersionResource, String>,
}

impl TrackerState {
    fn bucket(&mut self, gvr: &GroupVersionResource) -> &mut BTreeMap<ObjectKey, Unstructured> {
        self.objects.entry(gvr.clone()).or_default()
    }

    fn lookup(&self, gvr: &GroupVersionResource, ns: &str, name: &str) -> Option<&Unstructured> {
        self.objects
            .get(gvr)
            .and_then(|objs| objs.get(&(ns.to_string(), name.to_string())))
    }

    fn store(&mut self, gvr: &GroupVersionResource, obj: Unstructured) {
        if !obj.kind().is_empty() {
            self.kinds.insert(gvr.clone(), obj.kind().to_string());
        }
        let key = (obj.namespace().to_string(), obj.name().to_string());
        self.bucket(gvr).insert(key, obj);
    }
}

pub struct ObjectTracker {
    scheme: Scheme,
    list_kinds: ListKinds,
    state: Mutex<TrackerState>,
}

impl ObjectTracker {
    pub fn new(scheme: Scheme, list_kinds: ListKinds) -> Self {
        ObjectTracker {
            scheme,
            list_kinds,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Seeds an object. Resource is derived from `apiVersion` and `kind`.
    /// Collection documents (`FooList` with `items`) are split into items,
    /// which are stored all together or not at all.
    pub fn add(&self, obj: Unstructured) -> Result<()> {
        let items = if obj.is_list() {
            obj.into_items()?
        } else {
            vec![obj]
        };
        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            if item.kind().is_empty() || item.api_version().is_empty() {
                return Err(Error::Invalid(format!(
                    "object \"{}\" must set apiVersion and kind",
                    item.name()
                )));
            }
            let gvr = self.scheme.resource_for(&item.gvk());
            batch.push((gvr, item));
        }
        self.seed(batch)
    }

    /// Seeds an object under explicitly given resource
    pub fn add_with_resource(&self, gvr: &GroupVersionResource, obj: Unstructured) -> Result<()> {
        self.seed(vec![(gvr.clone(), obj)])
    }

    fn seed(&self, batch: Vec<(GroupVersionResource, Unstructured)>) -> Result<()> {
        for (_, obj) in &batch {
            check_name(obj)?;
            self.scheme.validate(obj)?;
        }
        let mut state = self.state.lock();
        let mut seen = BTreeSet::new();
        for (gvr, obj) in &batch {
            let fresh = seen.insert((gvr, obj.namespace(), obj.name()));
            if !fresh || state.lookup(gvr, obj.namespace(), obj.name()).is_some() {
                return Err(Error::already_exists(gvr, obj.name()));
            }
        }
        for (gvr, obj) in batch {
            tracing::debug!(
                resource = %gvr,
                namespace = obj.namespace(),
                name = obj.name(),
                "seeding object"
            );
            state.store(&gvr, obj);
        }
        Ok(())
    }

    /// Seeds a typed object
    pub fn add_typed<K>(&self, obj: &K) -> Result<()>
    where
        K: k8s_openapi::Resource + serde::Serialize,
    {
        self.add(Unstructured::from_typed(obj)?)
    }

    /// Subresource reads return the whole object.
    pub fn get(&self, gvr: &GroupVersionResource, ns: &str, name: &str) -> Result<Unstructured> {
        let state = self.state.lock();
        state
            .lookup(gvr, ns, name)
            .cloned()
            .ok_or_else(|| Error::not_found(gvr, name))
    }

    /// Lists objects of `gvr`. Empty `ns` lists across all namespaces.
    /// Items are sorted by namespace, then name.
    pub fn list(
        &self,
        gvr: &GroupVersionResource,
        ns: &str,
        opts: &ListOptions,
    ) -> Result<UnstructuredList> {
        let labels = match &opts.label_selector {
            Some(s) => LabelSelector::parse(s)?,
            None => LabelSelector::everything(),
        };
        let fields = match &opts.field_selector {
            Some(s) => FieldSelector::parse(s)?,
            None => FieldSelector::default(),
        };

        let state = self.state.lock();
        let kind = self.list_kind(&state, gvr)?;
        let mut list = UnstructuredList::new(&gvr.api_version(), &kind);
        if let Some(objs) = state.objects.get(gvr) {
            list.items = objs
                .iter()
                .filter(|((obj_ns, _), _)| ns.is_empty() || obj_ns == ns)
                .map(|(_, obj)| obj)
                .filter(|obj| labels.matches(&obj.labels()) && fields.matches(obj))
                .cloned()
                .collect();
        }
        if let Some(limit) = opts.limit.filter(|l| *l > 0) {
            list.items.truncate(limit as usize);
        }
        tracing::debug!(resource = %gvr, namespace = ns, kind = kind.as_str(), count = list.items.len(), "listed");
        Ok(list)
    }

    /// Resolves kind of the collection document for `gvr`:
    /// explicit mapping, then scheme list types, then `<Kind>List`.
    pub fn list_kind_for(&self, gvr: &GroupVersionResource) -> Result<String> {
        let state = self.state.lock();
        self.list_kind(&state, gvr)
    }

    fn list_kind(&self, state: &TrackerState, gvr: &GroupVersionResource) -> Result<String> {
        if let Some(kind) = self.list_kinds.get(gvr) {
            return Ok(kind.clone());
        }
        if let Some(kind) = self.scheme.list_kind_for(gvr) {
            return Ok(kind);
        }
        state
            .kinds
            .get(gvr)
            .cloned()
            .or_else(|| self.scheme.kind_for(gvr))
            .map(|kind| format!("{}List", kind))
            .ok_or_else(|| Error::UnknownListKind(gvr.clone()))
    }

    /// Creates an object in namespace `ns`.
    /// Subresource creation requires the object to exist and replaces it.
    pub fn create(
        &self,
        gvr: &GroupVersionResource,
        mut obj: Unstructured,
        ns: &str,
        params: WriteParams<'_>,
    ) -> Result<Unstructured> {
        align_namespace(&mut obj, ns)?;
        check_name(&obj)?;
        self.scheme.validate(&obj)?;

        let mut state = self.state.lock();
        let exists = state.lookup(gvr, ns, obj.name()).is_some();
        if params.subresource.is_empty() {
            if exists {
                return Err(Error::already_exists(gvr, obj.name()));
            }
        } else if !exists {
            return Err(Error::not_found(gvr, obj.name()));
        }
        tracing::debug!(
            resource = %gvr,
            namespace = ns,
            name = obj.name(),
            subresource = params.subresource,
            dry_run = params.dry_run,
            "create"
        );
        if !params.dry_run {
            state.store(gvr, obj.clone());
        }
        Ok(obj)
    }

    /// Replaces an existing object. Updates through a subresource
    /// replace the whole object as well.
    pub fn update(
        &self,
        gvr: &GroupVersionResource,
        mut obj: Unstructured,
        ns: &str,
        params: WriteParams<'_>,
    ) -> Result<Unstructured> {
        align_namespace(&mut obj, ns)?;
        check_name(&obj)?;
        self.scheme.validate(&obj)?;

        let mut state = self.state.lock();
        if state.lookup(gvr, ns, obj.name()).is_none() {
            return Err(Error::not_found(gvr, obj.name()));
        }
        tracing::debug!(
            resource = %gvr,
            namespace = ns,
            name = obj.name(),
            subresource = params.subresource,
            dry_run = params.dry_run,
            "update"
        );
        if !params.dry_run {
            state.store(gvr, obj.clone());
        }
        Ok(obj)
    }

    /// Deletes an object. Deleting a subresource only checks
    /// that the object exists.
    pub fn delete(
        &self,
        gvr: &GroupVersionResource,
        ns: &str,
        name: &str,
        params: WriteParams<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.lookup(gvr, ns, name).is_none() {
            return Err(Error::not_found(gvr, name));
        }
        tracing::debug!(
            resource = %gvr,
            namespace = ns,
            name,
            subresource = params.subresource,
            dry_run = params.dry_run,
            "delete"
        );
        if params.subresource.is_empty() && !params.dry_run {
            if let Some(objs) = state.objects.get_mut(gvr) {
                objs.remove(&(ns.to_string(), name.to_string()));
            }
        }
        Ok(())
    }

    /// Applies a patch to a stored object and stores the result.
    #[tracing::instrument(skip(self, patch, params), fields(resource = %gvr))]
    pub fn patch(
        &self,
        gvr: &GroupVersionResource,
        ns: &str,
        name: &str,
        patch_type: PatchType,
        patch: &[u8],
        params: WriteParams<'_>,
    ) -> Result<Unstructured> {
        let mut state = self.state.lock();
        let current = state
            .lookup(gvr, ns, name)
            .ok_or_else(|| Error::not_found(gvr, name))?;

        let merge_keys = self.scheme.merge_keys(&current.gvk());
        let patched = apply_patch(patch_type, current.as_value(), patch, merge_keys)?;
        let mut patched = Unstructured::from_value(patched)
            .map_err(|_| Error::InvalidPatch(crate::patch::INVALID_DOCUMENT.to_string()))?;
        if patched.name() != name {
            return Err(Error::BadRequest(format!(
                "patch must not change name of \"{}\" (got \"{}\")",
                name,
                patched.name()
            )));
        }
        align_namespace(&mut patched, ns)?;
        self.scheme.validate(&patched)?;

        tracing::debug!(dry_run = params.dry_run, "patched");
        if !params.dry_run {
            state.store(gvr, patched.clone());
        }
        Ok(patched)
    }

    /// Number of stored objects across all resources
    pub fn object_count(&self) -> usize {
        self.state.lock().objects.values().map(BTreeMap::len).sum()
    }

    /// Resources that currently hold at least one object
    pub fn resources(&self) -> Vec<GroupVersionResource> {
        self.state
            .lock()
            .objects
            .iter()
            .filter(|(_, objs)| !objs.is_empty())
            .map(|(gvr, _)| gvr.clone())
            .collect()
    }
}

fn check_name(obj: &Unstructured) -> Result<()> {
    if obj.name().is_empty() {
        return Err(Error::Invalid(format!(
            "{}: metadata.name is required",
            obj.gvk()
        )));
    }
    Ok(())
}

/// Object without namespace inherits the request namespace.
/// Conflicting namespaces are rejected.
fn align_namespace(obj: &mut Unstructured, ns: &str) -> Result<()> {
    if obj.namespace().is_empty() && !ns.is_empty() {
        obj.set_namespace(ns);
    }
    if obj.namespace() != ns {
        return Err(Error::BadRequest(format!(
            "request namespace does not match object namespace, request: \"{}\" object: \"{}\"",
            ns,
            obj.namespace()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gvk::GroupVersionKind;
    use serde_json::json;

    fn gvr() -> GroupVersionResource {
        GroupVersionResource::new("group", "version", "thekinds")
    }

    fn obj(ns: &str, name: &str) -> Unstructured {
        Unstructured::new("group/version", "TheKind")
            .with_namespace(ns)
            .with_name(name)
    }

    fn tracker() -> ObjectTracker {
        ObjectTracker::new(Scheme::new(), ListKinds::new())
    }

    #[test]
    fn add_then_get() {
        let t = tracker();
        t.add(obj("ns-foo", "name-foo")).unwrap();
        assert_eq!(t.get(&gvr(), "ns-foo", "name-foo").unwrap(), obj("ns-foo", "name-foo"));
        assert!(t.get(&gvr(), "other", "name-foo").unwrap_err().is_not_found());
        assert!(t.add(obj("ns-foo", "name-foo")).unwrap_err().is_already_exists());
    }

    #[test]
    fn add_rejects_untyped_documents() {
        let t = tracker();
        let u = Unstructured::from_value(json!({"metadata": {"name": "x"}})).unwrap();
        assert!(matches!(t.add(u), Err(Error::Invalid(_))));
        assert!(matches!(
            t.add(Unstructured::new("group/version", "TheKind")),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn failed_list_add_stores_nothing() {
        let list = |items: Vec<Unstructured>| {
            Unstructured::new("group/version", "TheKindList").with_field(
                "items",
                serde_json::Value::Array(items.into_iter().map(Unstructured::into_value).collect()),
            )
        };
        let t = tracker();
        let err = t
            .add(list(vec![obj("ns", "a"), obj("ns", "b"), obj("ns", "a")]))
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(t.object_count(), 0);

        t.add(obj("ns", "c")).unwrap();
        let err = t.add(list(vec![obj("ns", "d"), obj("ns", "c")])).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(t.object_count(), 1);

        t.add(list(vec![obj("ns", "d"), obj("other", "c")])).unwrap();
        assert_eq!(t.object_count(), 3);
    }

    #[test]
    fn list_is_sorted_and_scoped() {
        let t = tracker();
        for (ns, name) in &[("b", "x"), ("a", "z"), ("a", "y"), ("c", "a")] {
            t.add(obj(ns, name)).unwrap();
        }
        t.add(Unstructured::new("group2/version", "TheKind").with_name("other"))
            .unwrap();

        let all = t.list(&gvr(), "", &ListOptions::default()).unwrap();
        let keys: Vec<_> = all
            .items
            .iter()
            .map(|o| (o.namespace(), o.name()))
            .collect();
        assert_eq!(keys, vec![("a", "y"), ("a", "z"), ("b", "x"), ("c", "a")]);
        assert_eq!(all.kind, "TheKindList");
        assert_eq!(all.api_version, "group/version");

        let scoped = t.list(&gvr(), "a", &ListOptions::default()).unwrap();
        assert_eq!(scoped.names(), vec!["y", "z"]);
    }

    #[test]
    fn list_kind_tiers() {
        let mut list_kinds = ListKinds::new();
        list_kinds.insert(gvr(), "CustomList".to_string());
        let mut scheme = Scheme::new();
        scheme.add_known_type_with_name(GroupVersionKind::new("group", "version", "TheKindList"));

        let t = ObjectTracker::new(scheme.clone(), list_kinds);
        assert_eq!(t.list_kind_for(&gvr()).unwrap(), "CustomList");

        let t = ObjectTracker::new(scheme, ListKinds::new());
        assert_eq!(t.list_kind_for(&gvr()).unwrap(), "TheKindList");

        let t = tracker();
        assert!(matches!(
            t.list_kind_for(&gvr()),
            Err(Error::UnknownListKind(_))
        ));
        t.add(obj("ns", "a")).unwrap();
        assert_eq!(t.list_kind_for(&gvr()).unwrap(), "TheKindList");
    }

    #[test]
    fn create_aligns_namespace() {
        let t = tracker();
        let created = t
            .create(
                &gvr(),
                Unstructured::new("group/version", "TheKind").with_name("a"),
                "ns",
                WriteParams::default(),
            )
            .unwrap();
        assert_eq!(created.namespace(), "ns");

        let err = t
            .create(&gvr(), obj("other", "b"), "ns", WriteParams::default())
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(t.object_count(), 1);
    }

    #[test]
    fn dry_run_does_not_persist() {
        let t = tracker();
        let dry = WriteParams {
            subresource: "",
            dry_run: true,
        };
        t.create(&gvr(), obj("ns", "a"), "ns", dry).unwrap();
        assert_eq!(t.object_count(), 0);

        t.add(obj("ns", "a")).unwrap();
        t.update(&gvr(), obj("ns", "a").with_field("spec", json!({"x": 1})), "ns", dry)
            .unwrap();
        assert!(t.get(&gvr(), "ns", "a").unwrap().nested_field(&["spec"]).is_none());

        t.delete(&gvr(), "ns", "a", dry).unwrap();
        t.patch(&gvr(), "ns", "a", PatchType::MergePatch, br#"{"spec":{"x":2}}"#, dry)
            .unwrap();
        assert_eq!(t.get(&gvr(), "ns", "a").unwrap(), obj("ns", "a"));
    }

    #[test]
    fn subresource_writes() {
        let t = tracker();
        let err = t
            .create(&gvr(), obj("ns", "a"), "ns", WriteParams::subresource("status"))
            .unwrap_err();
        assert!(err.is_not_found());

        t.add(obj("ns", "a")).unwrap();
        let with_status = obj("ns", "a").with_field("status", json!({"ready": true}));
        t.update(&gvr(), with_status.clone(), "ns", WriteParams::subresource("status"))
            .unwrap();
        assert_eq!(t.get(&gvr(), "ns", "a").unwrap(), with_status);

        t.delete(&gvr(), "ns", "a", WriteParams::subresource("status"))
            .unwrap();
        assert!(t.get(&gvr(), "ns", "a").is_ok());
        assert!(t
            .delete(&gvr(), "ns", "missing", WriteParams::subresource("status"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn failed_patch_leaves_object_untouched() {
        let t = tracker();
        let original = obj("ns", "a").with_field("spec", json!({"foo": "bar"}));
        t.add(original.clone()).unwrap();
        for (pt, body) in &[
            (PatchType::JsonPatch, &br#"[{"op": "remove", "path": "/spec/missing"}]"#[..]),
            (PatchType::MergePatch, &b"[]"[..]),
            (PatchType::MergePatch, &br#"{"metadata": {"name": "renamed"}}"#[..]),
            (PatchType::Apply, &b"{}"[..]),
        ] {
            assert!(t.patch(&gvr(), "ns", "a", *pt, body, WriteParams::default()).is_err());
        }
        assert_eq!(t.get(&gvr(), "ns", "a").unwrap(), original);
    }

    #[test]
    fn typed_scheme_validates_writes() {
        use k8s_openapi::api::core::v1::Pod;
        let mut scheme = Scheme::new();
        scheme.register::<Pod>();
        let t = ObjectTracker::new(scheme, ListKinds::new());
        let pods = GroupVersionResource::new("", "v1", "pods");

        let mut pod = Pod::default();
        pod.metadata.name = Some("p".to_string());
        pod.metadata.namespace = Some("ns".to_string());
        t.add_typed(&pod).unwrap();
        assert_eq!(t.resources(), vec![pods.clone()]);

        let err = t
            .patch(
                &pods,
                "ns",
                "p",
                PatchType::MergePatch,
                br#"{"spec": {"containers": 7}}"#,
                WriteParams::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
        assert_eq!(t.list_kind_for(&pods).unwrap(), "PodList");
    }
}
