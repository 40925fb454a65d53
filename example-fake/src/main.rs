use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kube_fake::{
    fixtures, ClientBuilder, DeleteOptions, GroupVersionResource, ListOptions, PatchOptions,
    PatchType, Scheme,
};
use std::path::PathBuf;

/// Loads manifests into a fake cluster, runs one request against it
/// and prints the result together with the recorded actions.
#[derive(Parser, Debug)]
struct Args {
    /// YAML manifests to seed the store with. Can be given several times.
    #[clap(long = "fixtures", short = 'f')]
    fixtures: Vec<PathBuf>,
    /// Namespace of the request; empty means cluster scope
    #[clap(long, short = 'n', default_value = "")]
    namespace: String,
    /// Do not register built-in Kubernetes types
    #[clap(long)]
    schemaless: bool,
    /// Override list kind, e.g. `group/version/thekinds=TheKindList`
    #[clap(long = "list-kind")]
    list_kinds: Vec<String>,
    /// Perform writes as dry-run
    #[clap(long)]
    dry_run: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Get {
        resource: GroupVersionResource,
        name: String,
    },
    List {
        resource: GroupVersionResource,
        /// Label selector
        #[clap(long, short = 'l')]
        selector: Option<String>,
    },
    Patch {
        resource: GroupVersionResource,
        name: String,
        /// Patch type: `json`, `merge` or `strategic`
        #[clap(long = "type", default_value = "strategic")]
        patch_type: String,
        /// Patch body
        body: String,
    },
    Delete {
        resource: GroupVersionResource,
        name: String,
    },
}

fn parse_patch_type(s: &str) -> anyhow::Result<PatchType> {
    let pt = match s {
        "json" => PatchType::JsonPatch,
        "merge" => PatchType::MergePatch,
        "strategic" => PatchType::StrategicMergePatch,
        other => PatchType::from_content_type(other)?,
    };
    Ok(pt)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    tracing::info!(args = ?args, "parsed command-line arguments");

    let mut builder = ClientBuilder::new();
    if !args.schemaless {
        builder.scheme(Scheme::with_builtin_types());
    }
    for spec in &args.list_kinds {
        let (resource, kind) = spec
            .split_once('=')
            .with_context(|| format!("list kind override {} must look like gvr=Kind", spec))?;
        builder.list_kind(&resource.parse()?, kind);
    }
    for path in &args.fixtures {
        builder.objects(fixtures::from_file(path)?);
    }
    let client = builder.build().context("failed to seed fake client")?;
    tracing::info!(
        objects = client.tracker().object_count(),
        "Fake cluster is ready"
    );

    let dry_run = if args.dry_run {
        vec![kube_fake::params::DRY_RUN_ALL.to_string()]
    } else {
        Vec::new()
    };
    let output = match &args.command {
        Command::Get { resource, name } => {
            let obj = client
                .resource(resource)
                .namespace(&args.namespace)
                .get(name, &[])?;
            serde_json::to_value(obj)?
        }
        Command::List { resource, selector } => {
            let opts = ListOptions {
                label_selector: selector.clone(),
                ..Default::default()
            };
            let list = client
                .resource(resource)
                .namespace(&args.namespace)
                .list(&opts)?;
            serde_json::to_value(list)?
        }
        Command::Patch {
            resource,
            name,
            patch_type,
            body,
        } => {
            let opts = PatchOptions {
                dry_run,
                field_manager: "example-fake".to_string(),
                ..Default::default()
            };
            let obj = client.resource(resource).namespace(&args.namespace).patch(
                name,
                parse_patch_type(patch_type)?,
                body.as_bytes(),
                &opts,
                &[],
            )?;
            serde_json::to_value(obj)?
        }
        Command::Delete { resource, name } => {
            let opts = DeleteOptions {
                dry_run,
                ..Default::default()
            };
            client
                .resource(resource)
                .namespace(&args.namespace)
                .delete(name, &opts, &[])?;
            serde_json::json!({ "deleted": name })
        }
    };
    print!("{}", serde_yaml::to_string(&output)?);

    for action in client.actions() {
        tracing::info!(
            verb = action.verb().as_ref(),
            resource = %action.resource,
            namespace = action.namespace.as_str(),
            name = action.name.as_str(),
            dry_run = action.is_dry_run(),
            "recorded action"
        );
    }
    Ok(())
}
