//! Action log: every call made through the fake client is recorded here.

use crate::{
    gvk::GroupVersionResource,
    params::{CreateOptions, DeleteOptions, GetOptions, ListOptions, PatchOptions, UpdateOptions},
    patch::PatchType,
    unstructured::Unstructured,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
    Patch,
}

/// Verb-specific part of an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Get(GetOptions),
    List(ListOptions),
    Create {
        object: Unstructured,
        options: CreateOptions,
    },
    Update {
        object: Unstructured,
        options: UpdateOptions,
    },
    Delete(DeleteOptions),
    Patch {
        patch_type: PatchType,
        patch: Vec<u8>,
        options: PatchOptions,
    },
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub resource: GroupVersionResource,
    pub namespace: String,
    /// Subresource path, e.g. `status`; empty for the main resource
    pub subresource: String,
    /// Name addressed by the call. Empty for list, update and plain create
    /// calls, their object carries the name.
    pub name: String,
    pub payload: ActionPayload,
}

impl Action {
    pub fn verb(&self) -> Verb {
        match &self.payload {
            ActionPayload::Get(_) => Verb::Get,
            ActionPayload::List(_) => Verb::List,
            ActionPayload::Create { .. } => Verb::Create,
            ActionPayload::Update { .. } => Verb::Update,
            ActionPayload::Delete(_) => Verb::Delete,
            ActionPayload::Patch { .. } => Verb::Patch,
        }
    }

    /// Object carried by create and update actions
    pub fn object(&self) -> Option<&Unstructured> {
        match &self.payload {
            ActionPayload::Create { object, .. } | ActionPayload::Update { object, .. } => {
                Some(object)
            }
            _ => None,
        }
    }

    /// True if the call asked for a dry run
    pub fn is_dry_run(&self) -> bool {
        match &self.payload {
            ActionPayload::Create { options, .. } => options.is_dry_run(),
            ActionPayload::Update { options, .. } => options.is_dry_run(),
            ActionPayload::Delete(options) => options.is_dry_run(),
            ActionPayload::Patch { options, .. } => options.is_dry_run(),
            ActionPayload::Get(_) | ActionPayload::List(_) => false,
        }
    }

    /// Checks verb and resource against patterns, `*` matches anything.
    pub fn matches(&self, verb: &str, resource: &str) -> bool {
        (verb == "*" || verb == self.verb().as_ref())
            && (resource == "*" || resource == self.resource.resource)
    }
}

/// Shared append-only list of actions.
#[derive(Debug, Clone, Default)]
pub struct ActionLog(Arc<Mutex<Vec<Action>>>);

impl ActionLog {
    pub fn new() -> Self {
        ActionLog::default()
    }

    pub fn record(&self, action: Action) {
        tracing::trace!(
            verb = action.verb().as_ref(),
            resource = %action.resource,
            namespace = action.namespace.as_str(),
            name = action.name.as_str(),
            "recording action"
        );
        self.0.lock().push(action);
    }

    /// Copy of all actions in call order
    pub fn snapshot(&self) -> Vec<Action> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
