//! One `template` invocation end to end
//!
//! values -> context -> render -> assemble -> modeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_core::{ChartInfo, Modeline, Project, SecretsBundle, TemplateContext, ValueSources, VersionContract, VersionInfo};
use cairn_node::LookupProvider;

use crate::assembler::{Assembler, FullOptions};
use crate::engine::{Engine, TemplateSource};
use crate::error::Result;

/// Everything a render needs besides the lookup provider
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub project: Project,
    /// Selected templates, rendered in this order
    pub templates: Vec<PathBuf>,
    pub values: ValueSources,
    pub full: bool,
    pub strict: bool,
    pub contract: VersionContract,
    /// Defaults to the version bundled with `contract`
    pub kubernetes_version: Option<String>,
    pub secrets: Option<PathBuf>,
    /// Recorded in the modeline
    pub nodes: Vec<String>,
    pub endpoints: Vec<String>,
}

/// Modeline plus the assembled body
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub modeline: Modeline,
    pub body: String,
}

impl fmt::Display for RenderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.modeline, self.body)
    }
}

fn load_templates(project: &Project, paths: &[PathBuf]) -> Result<Vec<TemplateSource>> {
    paths
        .iter()
        .map(|path| {
            let resolved = project.resolve(path);
            TemplateSource::load(&resolved, project.relative_name(&resolved))
        })
        .collect()
}

fn load_library(project: &Project, selected: &[TemplateSource]) -> Result<Vec<TemplateSource>> {
    let mut library = Vec::new();
    for path in project.helper_files()? {
        let name = project.relative_name(&path);
        if selected.iter().any(|t| t.name == name) {
            continue;
        }
        library.push(TemplateSource::load(&path, name)?);
    }
    Ok(library)
}

fn endpoint_of(values: &serde_json::Value) -> String {
    values
        .get("endpoint")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Render the selected templates and assemble the output
///
/// The provider lives for the duration of this call only.
pub fn render(options: &RenderOptions, provider: Arc<dyn LookupProvider>) -> Result<RenderOutput> {
    let values = options.values.resolve()?;

    let templates = load_templates(&options.project, &options.templates)?;
    let library = load_library(&options.project, &templates)?;
    tracing::debug!(
        templates = ?templates.iter().map(|t| &t.name).collect::<Vec<_>>(),
        helpers = library.len(),
        "loaded templates"
    );

    let kubernetes_version = options
        .kubernetes_version
        .clone()
        .unwrap_or_else(|| options.contract.default_kubernetes_version().to_string());

    let engine = Engine::builder().strict(options.strict).lookup(provider).build();

    let context = TemplateContext::new(
        values,
        ChartInfo::from(&options.project.chart),
        VersionInfo::new(options.contract, &kubernetes_version),
    );
    let machine_type = engine.discovery(&context).machine_type()?;
    let context = context.with_machine_type(machine_type);

    let fragments = engine.render(&library, &templates, &context)?;

    let assembler = if options.full {
        let secrets = options
            .secrets
            .as_deref()
            .map(|p: &Path| SecretsBundle::load(options.project.resolve(p)))
            .transpose()?;
        Assembler::full(FullOptions {
            cluster_name: options.project.chart.name.clone(),
            endpoint: endpoint_of(&context.values),
            contract: options.contract,
            kubernetes_version: context.versions.kubernetes.clone(),
            secrets,
            discovered_machine_type: context.machine_type.clone(),
        })
    } else {
        Assembler::patch()
    };

    let body = assembler.assemble(&fragments)?;
    let modeline = Modeline::new(
        options.nodes.clone(),
        options.endpoints.clone(),
        templates.into_iter().map(|t| t.name).collect(),
    );

    Ok(RenderOutput { modeline, body })
}
