//! In-memory fake of the Kubernetes dynamic client.
//!
//! Objects are stored by group/version/resource, namespace and name.
//! Calls made through [`FakeDynamicClient`] are executed against the
//! [`ObjectTracker`](tracker::ObjectTracker) and recorded in an action log,
//! so tests can assert both on the resulting state and on the calls made.
pub mod actions;
pub mod builder;
pub mod client;
pub mod errors;
pub mod fixtures;
pub mod gvk;
pub mod params;
pub mod patch;
pub mod reactor;
pub mod scheme;
pub mod selector;
pub mod tracker;
pub mod unstructured;

pub use actions::{Action, ActionPayload, Verb};
pub use builder::ClientBuilder;
pub use client::{FakeDynamicClient, NamespaceableResourceClient, ResourceClient};
pub use errors::{Error, Result};
pub use gvk::{GroupVersionKind, GroupVersionResource};
pub use params::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, PatchOptions, UpdateOptions,
};
pub use patch::PatchType;
pub use reactor::Reaction;
pub use scheme::Scheme;
pub use unstructured::{Unstructured, UnstructuredList};
