use crate::{
    client::FakeDynamicClient,
    errors::Result,
    fixtures,
    gvk::GroupVersionResource,
    scheme::Scheme,
    tracker::{ListKinds, ObjectTracker},
    unstructured::Unstructured,
};

/// Utility for fake client creation
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    scheme: Scheme,
    list_kinds: ListKinds,
    objects: Vec<Unstructured>,
    typed: Vec<Result<Unstructured>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder::default()
    }

    pub fn scheme(&mut self, scheme: Scheme) -> &mut Self {
        self.scheme = scheme;
        self
    }

    /// Registers k8s-openapi type in the scheme
    pub fn register<K>(&mut self) -> &mut Self
    where
        K: k8s_openapi::Resource + k8s_openapi::ListableResource + serde::de::DeserializeOwned,
    {
        self.scheme.register::<K>();
        self
    }

    /// Overrides kind of list documents returned for `gvr`
    pub fn list_kind(&mut self, gvr: &GroupVersionResource, kind: &str) -> &mut Self {
        self.list_kinds.insert(gvr.clone(), kind.to_string());
        self
    }

    pub fn list_kinds(&mut self, list_kinds: ListKinds) -> &mut Self {
        self.list_kinds.extend(list_kinds);
        self
    }

    pub fn object(&mut self, obj: Unstructured) -> &mut Self {
        self.objects.push(obj);
        self
    }

    pub fn objects<I: IntoIterator<Item = Unstructured>>(&mut self, objs: I) -> &mut Self {
        self.objects.extend(objs);
        self
    }

    /// Seeds typed object. Conversion errors are reported by `build`.
    pub fn typed_object<K>(&mut self, obj: &K) -> &mut Self
    where
        K: k8s_openapi::Resource + serde::Serialize,
    {
        self.typed.push(Unstructured::from_typed(obj));
        self
    }

    /// Seeds objects from multi-document YAML
    pub fn with_yaml(&mut self, yaml: &str) -> anyhow::Result<&mut Self> {
        let objs = fixtures::from_yaml(yaml)?;
        Ok(self.objects(objs))
    }

    pub fn build(&self) -> Result<FakeDynamicClient> {
        let tracker = ObjectTracker::new(self.scheme.clone(), self.list_kinds.clone());
        for obj in &self.objects {
            tracker.add(obj.clone())?;
        }
        for obj in &self.typed {
            tracker.add(obj.clone()?)?;
        }
        tracing::debug!(objects = tracker.object_count(), "built fake client");
        Ok(FakeDynamicClient::new(tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn seeds_all_sources() {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some("typed".to_string());
        cm.metadata.namespace = Some("default".to_string());

        let client = ClientBuilder::new()
            .register::<ConfigMap>()
            .object(
                Unstructured::new("v1", "ConfigMap")
                    .with_namespace("default")
                    .with_name("plain"),
            )
            .typed_object(&cm)
            .with_yaml("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: yaml\n  namespace: default\n")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(client.tracker().object_count(), 3);

        let cms = GroupVersionResource::new("", "v1", "configmaps");
        let typed: ConfigMap = client
            .resource(&cms)
            .namespace("default")
            .get_as("typed")
            .unwrap();
        assert_eq!(typed.metadata.name.as_deref(), Some("typed"));
    }

    #[test]
    fn duplicate_seed_fails_build() {
        let obj = Unstructured::new("group/version", "TheKind").with_name("a");
        let err = ClientBuilder::new()
            .object(obj.clone())
            .object(obj)
            .build()
            .unwrap_err();
        assert!(err.is_already_exists());
    }
}
