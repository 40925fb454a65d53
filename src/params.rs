//! Request options accepted by the client verbs.
//!
//! Options are recorded in the action log. Apart from dry-run and list
//! selectors they do not influence the stored state.

use kube::core::params::{DeleteParams, PatchParams, PostParams, PropagationPolicy};

/// Value of the `dryRun` option that requests all stages to be dry-run.
pub const DRY_RUN_ALL: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    pub fn labels(selector: &str) -> Self {
        ListOptions {
            label_selector: Some(selector.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Non-empty value suppresses persistence
    pub dry_run: Vec<String>,
    pub field_manager: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Non-empty value suppresses persistence
    pub dry_run: Vec<String>,
    pub field_manager: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Non-empty value suppresses persistence
    pub dry_run: Vec<String>,
    /// Recorded only, there is no garbage collector
    pub orphan_dependents: Option<bool>,
    pub propagation_policy: Option<String>,
    pub grace_period_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Non-empty value suppresses persistence
    pub dry_run: Vec<String>,
    pub field_manager: String,
    pub force: Option<bool>,
}

macro_rules! impl_dry_run {
    ($($ty: ident),*) => {
        $(
            impl $ty {
                pub fn dry_run() -> Self {
                    $ty {
                        dry_run: vec![DRY_RUN_ALL.to_string()],
                        ..Default::default()
                    }
                }

                pub fn is_dry_run(&self) -> bool {
                    !self.dry_run.is_empty()
                }
            }
        )*
    };
}

impl_dry_run!(CreateOptions, UpdateOptions, DeleteOptions, PatchOptions);

fn dry_run_flag(dry_run: bool) -> Vec<String> {
    if dry_run {
        vec![DRY_RUN_ALL.to_string()]
    } else {
        Vec::new()
    }
}

impl From<&PostParams> for CreateOptions {
    fn from(pp: &PostParams) -> Self {
        CreateOptions {
            dry_run: dry_run_flag(pp.dry_run),
            field_manager: pp.field_manager.clone().unwrap_or_default(),
        }
    }
}

impl From<&PostParams> for UpdateOptions {
    fn from(pp: &PostParams) -> Self {
        UpdateOptions {
            dry_run: dry_run_flag(pp.dry_run),
            field_manager: pp.field_manager.clone().unwrap_or_default(),
        }
    }
}

impl From<&DeleteParams> for DeleteOptions {
    fn from(dp: &DeleteParams) -> Self {
        let propagation_policy = dp.propagation_policy.as_ref().map(|p| {
            match p {
                PropagationPolicy::Orphan => "Orphan",
                PropagationPolicy::Background => "Background",
                PropagationPolicy::Foreground => "Foreground",
            }
            .to_string()
        });
        DeleteOptions {
            dry_run: dry_run_flag(dp.dry_run),
            orphan_dependents: None,
            propagation_policy,
            grace_period_seconds: dp.grace_period_seconds,
        }
    }
}

impl From<&PatchParams> for PatchOptions {
    fn from(pp: &PatchParams) -> Self {
        PatchOptions {
            dry_run: dry_run_flag(pp.dry_run),
            field_manager: pp.field_manager.clone().unwrap_or_default(),
            force: if pp.force { Some(true) } else { None },
        }
    }
}
