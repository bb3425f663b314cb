//! Template command - render templates and print the result

use clap::{ArgMatches, Args};
use std::path::{Path, PathBuf};

use cairn_core::{Project, SetKind, SetSpec, TemplateOptions, ValueSources, VersionContract};
use cairn_engine::RenderOptions;
use cairn_node::{ConnectOptions, LookupMode};

use crate::GlobalArgs;
use crate::error::{CliError, Result};

#[derive(Args, Debug, Default)]
pub struct TemplateArgs {
    /// Templates to render, in order (can specify multiple)
    #[arg(short = 't', long = "template", required = true, value_delimiter = ',')]
    pub templates: Vec<PathBuf>,

    /// Values file(s) to merge, in order
    #[arg(long = "values", value_delimiter = ',')]
    pub values: Vec<PathBuf>,

    /// Set values (key1=val1,key2=val2)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set STRING values (key1=val1,key2=val2)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Set values from files (key1=path1,key2=path2)
    #[arg(long = "set-file")]
    pub set_file: Vec<String>,

    /// Set JSON values (key1=jsonval1,key2=jsonval2)
    #[arg(long = "set-json")]
    pub set_json: Vec<String>,

    /// Set a single literal STRING value
    #[arg(long = "set-literal")]
    pub set_literal: Vec<String>,

    /// Disable node lookups; every lookup helper renders empty
    #[arg(long)]
    pub offline: bool,

    /// Reach the node's maintenance service without authentication
    #[arg(short = 'i', long)]
    pub insecure: bool,

    /// Print the full configuration, not only the patch
    #[arg(long)]
    pub full: bool,

    /// Operating system version contract, e.g. v1.7
    #[arg(long)]
    pub os_version: Option<String>,

    /// Kubernetes version to generate for
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    /// Secrets bundle used by --full
    #[arg(long)]
    pub with_secrets: Option<PathBuf>,

    /// Serve lookups from a resource dump instead of a node
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Fail on undefined variables
    #[arg(long)]
    pub strict: bool,
}

const SET_FLAGS: [(&str, SetKind); 5] = [
    ("set", SetKind::Plain),
    ("set_string", SetKind::String),
    ("set_file", SetKind::File),
    ("set_json", SetKind::Json),
    ("set_literal", SetKind::Literal),
];

/// Inline assignments in the order they were given, across all five flags
fn ordered_sets(args: &TemplateArgs, matches: Option<&ArgMatches>) -> Vec<SetSpec> {
    let Some(matches) = matches else {
        // No parse positions: keep flag-by-flag order
        return [
            (&args.set, SetKind::Plain),
            (&args.set_string, SetKind::String),
            (&args.set_file, SetKind::File),
            (&args.set_json, SetKind::Json),
            (&args.set_literal, SetKind::Literal),
        ]
        .into_iter()
        .flat_map(|(raws, kind)| raws.iter().map(move |raw| SetSpec::new(kind, raw.clone())))
        .collect();
    };

    let mut indexed = Vec::new();
    for (id, kind) in SET_FLAGS {
        if let (Some(raws), Some(indices)) = (matches.get_many::<String>(id), matches.indices_of(id)) {
            indexed.extend(indices.zip(raws).map(|(i, raw)| (i, SetSpec::new(kind, raw.clone()))));
        }
    }
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, spec)| spec).collect()
}

/// Project defaults first, then the command line
fn project_sets(options: &TemplateOptions) -> Vec<SetSpec> {
    [
        (&options.values, SetKind::Plain),
        (&options.string_values, SetKind::String),
        (&options.file_values, SetKind::File),
        (&options.json_values, SetKind::Json),
        (&options.literal_values, SetKind::Literal),
    ]
    .into_iter()
    .flat_map(|(raws, kind)| raws.iter().map(move |raw| SetSpec::new(kind, raw.clone())))
    .collect()
}

fn default_node_config() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cairn").join("config"))
}

fn node_config(globals: &GlobalArgs, project: &Project) -> Option<PathBuf> {
    globals
        .node_config
        .clone()
        .or_else(|| project.chart.global_options.node_config().map(|p| project.resolve(p)))
        .or_else(default_node_config)
}

/// Resolve the command line against the project's `templateOptions`
pub fn render_options(
    globals: &GlobalArgs,
    args: &TemplateArgs,
    matches: Option<&ArgMatches>,
    project: Project,
) -> Result<RenderOptions> {
    let defaults = &project.chart.template_options;

    let mut values = ValueSources::new().with_defaults(project.values_path.clone());
    for file in defaults.value_files.iter() {
        values = values.with_file(project.resolve(file));
    }
    for file in &args.values {
        values = values.with_file(file.clone());
    }
    values.sets = project_sets(defaults);
    values.sets.extend(ordered_sets(args, matches));

    let contract = match args.os_version.as_deref().or(defaults.os_version()) {
        Some(v) => VersionContract::parse(v)?,
        None => VersionContract::CURRENT,
    };

    let kubernetes_version = args
        .kubernetes_version
        .clone()
        .or_else(|| defaults.kubernetes_version().map(str::to_string));

    let secrets = args
        .with_secrets
        .clone()
        .or_else(|| defaults.with_secrets().map(|p| project.resolve(p)));

    Ok(RenderOptions {
        templates: args.templates.clone(),
        values,
        full: args.full || defaults.full,
        strict: args.strict,
        contract,
        kubernetes_version,
        secrets,
        nodes: globals.nodes.clone(),
        endpoints: globals.endpoints.clone(),
        project,
    })
}

fn lookup_mode(args: &TemplateArgs, defaults: &TemplateOptions) -> LookupMode {
    if args.offline || defaults.offline {
        LookupMode::Offline
    } else if args.insecure {
        LookupMode::Insecure
    } else {
        LookupMode::Authenticated
    }
}

fn load_project(root: &Path) -> Result<Project> {
    Project::load(root).map_err(|e| match e {
        cairn_core::CoreError::ProjectNotFound { .. } | cairn_core::CoreError::InvalidProject { .. } => {
            CliError::usage(e.to_string(), Some("Run `cairn init` to create a project".to_string()))
        }
        other => other.into(),
    })
}

pub fn run(globals: &GlobalArgs, args: &TemplateArgs, matches: Option<&ArgMatches>) -> Result<()> {
    let project = load_project(&globals.root)?;

    let mode = lookup_mode(args, &project.chart.template_options);
    let connect = ConnectOptions {
        endpoints: globals.endpoints.clone(),
        nodes: globals.nodes.clone(),
        node_config: node_config(globals, &project),
        snapshot: args.snapshot.clone(),
        timeout: project.chart.template_options.lookup_timeout,
    };
    tracing::debug!(?mode, "lookup mode");

    let options = render_options(globals, args, matches, project)?;

    let provider = cairn_node::open(mode, &connect)?;
    let output = cairn_engine::render(&options, provider)?;

    print!("{output}");
    Ok(())
}
