//! Init command - scaffold a project from an embedded preset

use console::style;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

pub const DEFAULT_PRESET: &str = "generic";

struct Preset {
    name: &'static str,
    os_version: &'static str,
    helpers: &'static str,
    values: &'static str,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "generic",
        os_version: "",
        helpers: include_str!("../presets/generic/_helpers.tpl"),
        values: include_str!("../presets/generic/values.yaml"),
    },
    Preset {
        name: "cozystack",
        os_version: "v1.7",
        helpers: include_str!("../presets/cozystack/_helpers.tpl"),
        values: include_str!("../presets/cozystack/values.yaml"),
    },
];

const DISCOVERY: &str = include_str!("../presets/_discovery.tpl");
const CONTROLPLANE: &str = include_str!("../presets/controlplane.yaml");
const WORKER: &str = include_str!("../presets/worker.yaml");

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

fn chart_yaml(name: &str, preset: &Preset) -> String {
    format!(
        r#"apiVersion: v2
name: {name}
type: application
version: {version}
globalOptions:
  nodeConfig: ""
templateOptions:
  offline: false
  valueFiles: []
  values: []
  stringValues: []
  fileValues: []
  jsonValues: []
  literalValues: []
  osVersion: "{os_version}"
  withSecrets: ""
  kubernetesVersion: ""
  full: false
  lookupTimeout: 30s
"#,
        version = env!("CARGO_PKG_VERSION"),
        os_version = preset.os_version,
    )
}

/// Files a preset produces, relative to the project root
fn files(name: &str, preset: &Preset) -> Vec<(&'static str, String)> {
    vec![
        ("Chart.yaml", chart_yaml(name, preset)),
        ("values.yaml", preset.values.to_string()),
        ("templates/_discovery.tpl", DISCOVERY.to_string()),
        ("templates/_helpers.tpl", preset.helpers.to_string()),
        ("templates/controlplane.yaml", CONTROLPLANE.to_string()),
        ("templates/worker.yaml", WORKER.to_string()),
    ]
}

/// Project name: the last component of the absolute root
fn project_name(root: &Path) -> Result<String> {
    let absolute = std::path::absolute(root)?;
    absolute
        .components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "/")
        .ok_or_else(|| {
            CliError::usage(
                format!("cannot derive a project name from {}", root.display()),
                Some("Pass --root with a named directory".to_string()),
            )
        })
}

pub fn run(root: &Path, preset: Option<&str>, force: bool) -> Result<()> {
    let wanted = preset.unwrap_or(DEFAULT_PRESET);
    let Some(preset) = PRESETS.iter().find(|p| p.name == wanted) else {
        return Err(CliError::usage(
            format!("unknown preset '{wanted}'"),
            Some(format!("Available presets: {}", preset_names().join(", "))),
        ));
    };

    let name = project_name(root)?;
    let files = files(&name, preset);

    // Refuse before writing anything
    if !force
        && let Some((path, _)) = files.iter().find(|(path, _)| root.join(path).exists())
    {
        return Err(CliError::io_with_help(
            format!("file {} already exists", root.join(path).display()),
            "use --force to overwrite",
        ));
    }

    for (path, content) in &files {
        let target: PathBuf = root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        tracing::debug!(path = %target.display(), "wrote preset file");
        eprintln!("{} {}", style("Created").green().bold(), target.display());
    }

    eprintln!();
    eprintln!(
        "{} project {} from preset {}",
        style("✓").green().bold(),
        style(&name).cyan(),
        style(preset.name).cyan()
    );

    Ok(())
}
