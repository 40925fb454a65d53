//! Reactors intercept client calls before they reach the object tracker.
//! They are used to inject failures or canned responses into tests.

use crate::{
    actions::Action,
    errors::{Error, Result},
    unstructured::{Unstructured, UnstructuredList},
};
use std::sync::Arc;

/// Response produced by a reactor instead of the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Object(Unstructured),
    List(UnstructuredList),
    Deleted,
}

impl Reaction {
    pub(crate) fn into_object(self) -> Result<Unstructured> {
        match self {
            Reaction::Object(obj) => Ok(obj),
            other => Err(mismatch("object", &other)),
        }
    }

    pub(crate) fn into_list(self) -> Result<UnstructuredList> {
        match self {
            Reaction::List(list) => Ok(list),
            other => Err(mismatch("list", &other)),
        }
    }

    pub(crate) fn into_deleted(self) -> Result<()> {
        match self {
            Reaction::Deleted => Ok(()),
            other => Err(mismatch("deletion", &other)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Reaction::Object(_) => "object",
            Reaction::List(_) => "list",
            Reaction::Deleted => "deletion",
        }
    }
}

fn mismatch(expected: &str, got: &Reaction) -> Error {
    Error::Reactor(format!(
        "reactor returned {} where {} was expected",
        got.name(),
        expected
    ))
}

/// Reactor handler. `None` passes the call on, `Some` answers it.
pub type ReactionFn = dyn Fn(&Action) -> Option<Result<Reaction>> + Send + Sync;

#[derive(Clone)]
pub(crate) struct Reactor {
    verb: String,
    resource: String,
    handler: Arc<ReactionFn>,
}

impl Reactor {
    pub(crate) fn new<F>(verb: &str, resource: &str, handler: F) -> Self
    where
        F: Fn(&Action) -> Option<Result<Reaction>> + Send + Sync + 'static,
    {
        Reactor {
            verb: verb.to_string(),
            resource: resource.to_string(),
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn react(&self, action: &Action) -> Option<Result<Reaction>> {
        if !action.matches(&self.verb, &self.resource) {
            return None;
        }
        (self.handler)(action)
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("verb", &self.verb)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Handler which fails every call it sees with `message`
pub fn fail_with(message: &str) -> impl Fn(&Action) -> Option<Result<Reaction>> + Send + Sync {
    let message = message.to_string();
    move |_| Some(Err(Error::Reactor(message.clone())))
}
