//! Dynamic client backed by the in-memory object tracker.
//!
//! ```
//! use kube_fake::{ClientBuilder, GroupVersionResource, Unstructured};
//!
//! let obj = Unstructured::new("group/version", "TheKind")
//!     .with_namespace("ns-foo")
//!     .with_name("name-foo");
//! let client = ClientBuilder::new().object(obj.clone()).build()?;
//! let gvr = GroupVersionResource::new("group", "version", "thekinds");
//! let got = client.resource(&gvr).namespace("ns-foo").get("name-foo", &[])?;
//! assert_eq!(got, obj);
//! assert_eq!(client.actions().len(), 1);
//! # Ok::<(), kube_fake::Error>(())
//! ```

use crate::{
    actions::{Action, ActionLog, ActionPayload},
    errors::{Error, Result},
    gvk::GroupVersionResource,
    params::{CreateOptions, DeleteOptions, GetOptions, ListOptions, PatchOptions, UpdateOptions},
    patch::PatchType,
    reactor::{Reaction, Reactor},
    tracker::{ObjectTracker, WriteParams},
    unstructured::{Unstructured, UnstructuredList},
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::{ops::Deref, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Fake dynamic client. Clones share storage, action log and reactors.
#[derive(Clone)]
pub struct FakeDynamicClient {
    tracker: Arc<ObjectTracker>,
    actions: ActionLog,
    reactors: Arc<RwLock<Vec<Reactor>>>,
    cancel: Option<CancellationToken>,
}

impl FakeDynamicClient {
    pub fn new(tracker: ObjectTracker) -> Self {
        FakeDynamicClient {
            tracker: Arc::new(tracker),
            actions: ActionLog::new(),
            reactors: Arc::new(RwLock::new(Vec::new())),
            cancel: None,
        }
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    /// Client whose calls fail with [`Error::Cancelled`] once `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        FakeDynamicClient {
            cancel: Some(token),
            ..self.clone()
        }
    }

    pub fn resource(&self, gvr: &GroupVersionResource) -> NamespaceableResourceClient {
        NamespaceableResourceClient(ResourceClient {
            client: self.clone(),
            gvr: gvr.clone(),
            namespace: String::new(),
        })
    }

    /// All actions recorded so far, in call order
    pub fn actions(&self) -> Vec<Action> {
        self.actions.snapshot()
    }

    pub fn clear_actions(&self) {
        self.actions.clear()
    }

    /// Adds reactor which runs before all registered ones.
    /// `verb` and `resource` may be `*`.
    pub fn prepend_reactor<F>(&self, verb: &str, resource: &str, handler: F)
    where
        F: Fn(&Action) -> Option<Result<Reaction>> + Send + Sync + 'static,
    {
        self.reactors
            .write()
            .insert(0, Reactor::new(verb, resource, handler));
    }

    /// Adds reactor which runs after all registered ones.
    pub fn add_reactor<F>(&self, verb: &str, resource: &str, handler: F)
    where
        F: Fn(&Action) -> Option<Result<Reaction>> + Send + Sync + 'static,
    {
        self.reactors
            .write()
            .push(Reactor::new(verb, resource, handler));
    }

    /// Records `action`, then lets reactors answer it, then falls back to `op`.
    fn invoke<F>(&self, action: Action, op: F) -> Result<Reaction>
    where
        F: FnOnce(&ObjectTracker) -> Result<Reaction>,
    {
        self.actions.record(action.clone());
        if self.cancel.as_ref().map_or(false, |c| c.is_cancelled()) {
            tracing::debug!(verb = action.verb().as_ref(), "client is cancelled");
            return Err(Error::Cancelled);
        }
        // handlers may call back into the client, so the lock is not held while they run
        let reactors = self.reactors.read().clone();
        for reactor in &reactors {
            if let Some(reaction) = reactor.react(&action) {
                tracing::debug!(
                    verb = action.verb().as_ref(),
                    resource = %action.resource,
                    name = action.name.as_str(),
                    "call answered by reactor"
                );
                return reaction;
            }
        }
        op(&self.tracker)
    }
}

impl std::fmt::Debug for FakeDynamicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDynamicClient")
            .field("objects", &self.tracker.object_count())
            .field("actions", &self.actions.len())
            .field("reactors", &*self.reactors.read())
            .finish()
    }
}

/// Client for one resource which is not yet bound to a namespace.
/// Used directly it addresses cluster-scoped objects.
#[derive(Debug, Clone)]
pub struct NamespaceableResourceClient(ResourceClient);

impl NamespaceableResourceClient {
    pub fn namespace(&self, namespace: &str) -> ResourceClient {
        ResourceClient {
            namespace: namespace.to_string(),
            ..self.0.clone()
        }
    }
}

impl Deref for NamespaceableResourceClient {
    type Target = ResourceClient;

    fn deref(&self) -> &ResourceClient {
        &self.0
    }
}

/// Client for one resource in one namespace
#[derive(Debug, Clone)]
pub struct ResourceClient {
    client: FakeDynamicClient,
    gvr: GroupVersionResource,
    namespace: String,
}

impl ResourceClient {
    pub fn resource(&self) -> &GroupVersionResource {
        &self.gvr
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace
    }

    fn action(&self, name: &str, subresources: &[&str], payload: ActionPayload) -> Action {
        Action {
            resource: self.gvr.clone(),
            namespace: self.namespace.clone(),
            subresource: subresources.join("/"),
            name: name.to_string(),
            payload,
        }
    }

    /// Reads an object. Reading a subresource returns the whole object.
    pub fn get(&self, name: &str, subresources: &[&str]) -> Result<Unstructured> {
        self.get_with(name, &GetOptions::default(), subresources)
    }

    pub fn get_with(
        &self,
        name: &str,
        options: &GetOptions,
        subresources: &[&str],
    ) -> Result<Unstructured> {
        let action = self.action(name, subresources, ActionPayload::Get(options.clone()));
        self.client
            .invoke(action, |tracker| {
                tracker
                    .get(&self.gvr, &self.namespace, name)
                    .map(Reaction::Object)
            })?
            .into_object()
    }

    /// Reads an object and decodes it into `K`.
    pub fn get_as<K: DeserializeOwned>(&self, name: &str) -> Result<K> {
        self.get(name, &[])?.decode()
    }

    pub fn list(&self, options: &ListOptions) -> Result<UnstructuredList> {
        let action = self.action("", &[], ActionPayload::List(options.clone()));
        self.client
            .invoke(action, |tracker| {
                tracker
                    .list(&self.gvr, &self.namespace, options)
                    .map(Reaction::List)
            })?
            .into_list()
    }

    /// Creates an object. Creating a subresource replaces the existing object.
    pub fn create(
        &self,
        obj: &Unstructured,
        options: &CreateOptions,
        subresources: &[&str],
    ) -> Result<Unstructured> {
        // only subresource creations address an existing object by name
        let name = if subresources.is_empty() { "" } else { obj.name() };
        let action = self.action(
            name,
            subresources,
            ActionPayload::Create {
                object: obj.clone(),
                options: options.clone(),
            },
        );
        let params = WriteParams {
            subresource: &action.subresource,
            dry_run: options.is_dry_run(),
        };
        self.client
            .invoke(action.clone(), |tracker| {
                tracker
                    .create(&self.gvr, obj.clone(), &self.namespace, params)
                    .map(Reaction::Object)
            })?
            .into_object()
    }

    pub fn update(
        &self,
        obj: &Unstructured,
        options: &UpdateOptions,
        subresources: &[&str],
    ) -> Result<Unstructured> {
        let action = self.action(
            "",
            subresources,
            ActionPayload::Update {
                object: obj.clone(),
                options: options.clone(),
            },
        );
        let params = WriteParams {
            subresource: &action.subresource,
            dry_run: options.is_dry_run(),
        };
        self.client
            .invoke(action.clone(), |tracker| {
                tracker
                    .update(&self.gvr, obj.clone(), &self.namespace, params)
                    .map(Reaction::Object)
            })?
            .into_object()
    }

    /// Same as `update(obj, options, &["status"])`
    pub fn update_status(&self, obj: &Unstructured, options: &UpdateOptions) -> Result<Unstructured> {
        self.update(obj, options, &["status"])
    }

    pub fn delete(&self, name: &str, options: &DeleteOptions, subresources: &[&str]) -> Result<()> {
        let action = self.action(name, subresources, ActionPayload::Delete(options.clone()));
        let params = WriteParams {
            subresource: &action.subresource,
            dry_run: options.is_dry_run(),
        };
        self.client
            .invoke(action.clone(), |tracker| {
                tracker
                    .delete(&self.gvr, &self.namespace, name, params)
                    .map(|()| Reaction::Deleted)
            })?
            .into_deleted()
    }

    pub fn patch(
        &self,
        name: &str,
        patch_type: PatchType,
        patch: &[u8],
        options: &PatchOptions,
        subresources: &[&str],
    ) -> Result<Unstructured> {
        let action = self.action(
            name,
            subresources,
            ActionPayload::Patch {
                patch_type,
                patch: patch.to_vec(),
                options: options.clone(),
            },
        );
        let params = WriteParams {
            subresource: &action.subresource,
            dry_run: options.is_dry_run(),
        };
        self.client
            .invoke(action.clone(), |tracker| {
                tracker
                    .patch(&self.gvr, &self.namespace, name, patch_type, patch, params)
                    .map(Reaction::Object)
            })?
            .into_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions::Verb, reactor::fail_with, scheme::Scheme, tracker::ListKinds};
    use serde_json::json;

    fn client() -> FakeDynamicClient {
        let tracker = ObjectTracker::new(Scheme::new(), ListKinds::new());
        tracker
            .add(
                Unstructured::new("group/version", "TheKind")
                    .with_namespace("ns")
                    .with_name("a"),
            )
            .unwrap();
        FakeDynamicClient::new(tracker)
    }

    fn gvr() -> GroupVersionResource {
        GroupVersionResource::new("group", "version", "thekinds")
    }

    #[test]
    fn every_call_is_recorded_once() {
        let client = client();
        let res = client.resource(&gvr()).namespace("ns");
        res.get("a", &[]).unwrap();
        res.get("missing", &[]).unwrap_err();
        res.list(&ListOptions::default()).unwrap();
        res.delete("a", &DeleteOptions::default(), &["status"]).unwrap();
        let verbs: Vec<_> = client.actions().iter().map(Action::verb).collect();
        assert_eq!(verbs, vec![Verb::Get, Verb::Get, Verb::List, Verb::Delete]);
        assert_eq!(client.actions()[3].subresource, "status");

        client.clear_actions();
        assert!(client.actions().is_empty());
    }

    #[test]
    fn reactors_short_circuit_tracker() {
        let client = client();
        client.add_reactor("delete", "*", fail_with("denied"));
        let res = client.resource(&gvr()).namespace("ns");
        let err = res.delete("a", &DeleteOptions::default(), &[]).unwrap_err();
        assert_eq!(err, Error::Reactor("denied".to_string()));
        assert!(res.get("a", &[]).is_ok());

        client.prepend_reactor("delete", "thekinds", |_| Some(Ok(Reaction::Deleted)));
        res.delete("missing", &DeleteOptions::default(), &[]).unwrap();
        assert_eq!(client.actions().len(), 3);
    }

    #[test]
    fn reactor_can_pass_through() {
        let client = client();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.add_reactor("*", "*", move |action| {
            sink.lock().push(action.name.clone());
            None
        });
        let res = client.resource(&gvr()).namespace("ns");
        res.patch(
            "a",
            PatchType::MergePatch,
            br#"{"spec": {"x": 1}}"#,
            &PatchOptions::default(),
            &[],
        )
        .unwrap();
        assert_eq!(*seen.lock(), vec!["a".to_string()]);
        assert_eq!(
            res.get("a", &[]).unwrap().nested_field(&["spec", "x"]),
            Some(&json!(1))
        );
    }

    #[test]
    fn cancelled_client_records_and_fails() {
        let token = CancellationToken::new();
        let base = client();
        let client = base.with_cancellation(token.clone());
        let res = client.resource(&gvr()).namespace("ns");
        res.get("a", &[]).unwrap();
        token.cancel();
        assert_eq!(res.get("a", &[]).unwrap_err(), Error::Cancelled);
        assert_eq!(base.actions().len(), 2);
        assert!(base.resource(&gvr()).namespace("ns").get("a", &[]).is_ok());
    }

    #[test]
    fn concurrent_creates_of_same_key() {
        fn assert_shareable<T: Clone + Send + Sync>() {}
        assert_shareable::<FakeDynamicClient>();

        let client = FakeDynamicClient::new(ObjectTracker::new(Scheme::new(), ListKinds::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                std::thread::spawn(move || {
                    let obj = Unstructured::new("group/version", "TheKind").with_name("racy");
                    client
                        .resource(&gvr())
                        .namespace("ns")
                        .create(&obj, &CreateOptions::default(), &[])
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(Error::is_already_exists));
        assert_eq!(client.tracker().object_count(), 1);
        assert_eq!(client.actions().len(), 8);
    }

    #[test]
    fn cluster_scoped_access() {
        let client = client();
        let nodes = GroupVersionResource::new("", "v1", "nodes");
        let node = Unstructured::new("v1", "Node").with_name("n1");
        client
            .resource(&nodes)
            .create(&node, &CreateOptions::default(), &[])
            .unwrap();
        assert_eq!(client.resource(&nodes).get("n1", &[]).unwrap(), node);
        assert_eq!(client.actions()[0].namespace, "");
    }
}
