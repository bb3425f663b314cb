//! Project definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Contents of a project's `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// API version (v2)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Project name, used as the cluster name of generated documents
    pub name: String,

    /// Project version (SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default, rename = "type")]
    pub kind: ChartKind,

    #[serde(default)]
    pub description: Option<String>,

    /// Static defaults for `cairn template`
    #[serde(default)]
    pub template_options: TemplateOptions,

    /// Options shared by every command
    #[serde(default)]
    pub global_options: GlobalOptions,
}

fn default_api_version() -> String {
    "v2".to_string()
}

/// Project type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Application,
    Library,
}

/// Project-level defaults for the `template` command
///
/// List options are prepended to the command line lists; scalar options
/// apply only when the flag is absent from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOptions {
    #[serde(default)]
    pub offline: bool,

    #[serde(default)]
    pub value_files: Vec<PathBuf>,

    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub string_values: Vec<String>,

    #[serde(default)]
    pub file_values: Vec<String>,

    #[serde(default)]
    pub json_values: Vec<String>,

    #[serde(default)]
    pub literal_values: Vec<String>,

    /// Operating system version contract, e.g. `v1.7`
    #[serde(default)]
    pub os_version: Option<String>,

    /// Secrets bundle path, relative to the project root
    #[serde(default)]
    pub with_secrets: Option<String>,

    #[serde(default)]
    pub kubernetes_version: Option<String>,

    #[serde(default)]
    pub full: bool,

    /// Per-call timeout for live lookups (default: 30s)
    #[serde(default = "default_lookup_timeout", with = "humantime_serde")]
    pub lookup_timeout: Duration,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            offline: false,
            value_files: Vec::new(),
            values: Vec::new(),
            string_values: Vec::new(),
            file_values: Vec::new(),
            json_values: Vec::new(),
            literal_values: Vec::new(),
            os_version: None,
            with_secrets: None,
            kubernetes_version: None,
            full: false,
            lookup_timeout: default_lookup_timeout(),
        }
    }
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(30)
}

impl TemplateOptions {
    pub fn os_version(&self) -> Option<&str> {
        non_empty(&self.os_version)
    }

    pub fn with_secrets(&self) -> Option<&str> {
        non_empty(&self.with_secrets)
    }

    pub fn kubernetes_version(&self) -> Option<&str> {
        non_empty(&self.kubernetes_version)
    }
}

/// Options shared by every command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOptions {
    /// Node connection config, relative to the project root
    #[serde(default)]
    pub node_config: Option<String>,
}

impl GlobalOptions {
    pub fn node_config(&self) -> Option<&str> {
        non_empty(&self.node_config)
    }
}

// Presets write `""` for unset scalars
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Loaded project with resolved paths
#[derive(Debug, Clone)]
pub struct Project {
    pub chart: Chart,

    /// Root directory of the project
    pub root: PathBuf,

    /// Templates directory
    pub templates_dir: PathBuf,

    /// Default values file path
    pub values_path: PathBuf,
}

impl Project {
    /// Load a project from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join("Chart.yaml");
        if !chart_file.exists() {
            return Err(CoreError::InvalidProject {
                message: format!("Chart.yaml not found in {}", root.display()),
            });
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let chart: Chart = serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidProject {
            message: e.to_string(),
        })?;

        if chart.name.trim().is_empty() {
            return Err(CoreError::InvalidProject {
                message: "name must not be empty".to_string(),
            });
        }

        tracing::debug!(name = %chart.name, version = %chart.version, "loaded project");

        Ok(Self {
            chart,
            templates_dir: root.join("templates"),
            values_path: root.join("values.yaml"),
            root,
        })
    }

    /// Shared helper files: everything under `templates/` whose file name
    /// starts with `_`, sorted for deterministic definition order
    pub fn helper_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_helper = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('_'));
            if path.is_file() && is_helper {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Resolve a path given relative to the project root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path of `file` relative to the project root, with `/` separators
    pub fn relative_name(&self, file: &Path) -> String {
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CHART: &str = r#"apiVersion: v2
name: lab
type: application
version: 0.1.0
globalOptions:
  nodeConfig: "nodeconfig"
templateOptions:
  offline: false
  valueFiles: [site.yaml]
  values: ["network.mtu=9000"]
  osVersion: "v1.7"
  withSecrets: "secrets.yaml"
  kubernetesVersion: ""
  full: false
  lookupTimeout: 5s
"#;

    fn project_dir(chart: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Chart.yaml"), chart).unwrap();
        fs::create_dir_all(dir.path().join("templates/lib")).unwrap();
        fs::write(dir.path().join("templates/_helpers.tpl"), "").unwrap();
        fs::write(dir.path().join("templates/lib/_net.tpl"), "").unwrap();
        fs::write(dir.path().join("templates/controlplane.yaml"), "").unwrap();
        dir
    }

    #[test]
    fn test_load_project() {
        let dir = project_dir(CHART);
        let project = Project::load(dir.path()).unwrap();

        assert_eq!(project.chart.name, "lab");
        assert_eq!(project.chart.version, Version::new(0, 1, 0));
        assert_eq!(project.chart.kind, ChartKind::Application);

        let opts = &project.chart.template_options;
        assert_eq!(opts.value_files, vec![PathBuf::from("site.yaml")]);
        assert_eq!(opts.values, vec!["network.mtu=9000".to_string()]);
        assert_eq!(opts.os_version(), Some("v1.7"));
        assert_eq!(opts.with_secrets(), Some("secrets.yaml"));
        assert_eq!(opts.kubernetes_version(), None);
        assert_eq!(opts.lookup_timeout, Duration::from_secs(5));
        assert_eq!(project.chart.global_options.node_config(), Some("nodeconfig"));
    }

    #[test]
    fn test_minimal_chart_defaults() {
        let dir = project_dir("name: lab\nversion: 1.0.0\n");
        let project = Project::load(dir.path()).unwrap();
        let opts = &project.chart.template_options;

        assert!(!opts.offline);
        assert!(opts.values.is_empty());
        assert_eq!(opts.lookup_timeout, Duration::from_secs(30));
        assert_eq!(project.chart.api_version, "v2");
    }

    #[test]
    fn test_helper_files() {
        let dir = project_dir(CHART);
        let project = Project::load(dir.path()).unwrap();
        let helpers: Vec<String> = project
            .helper_files()
            .unwrap()
            .iter()
            .map(|p| project.relative_name(p))
            .collect();

        assert_eq!(helpers, vec!["templates/_helpers.tpl", "templates/lib/_net.tpl"]);
    }

    #[test]
    fn test_missing_project() {
        let err = Project::load("/nonexistent/project").unwrap_err();
        assert!(matches!(err, CoreError::ProjectNotFound { .. }));
    }

    #[test]
    fn test_missing_chart_file() {
        let dir = TempDir::new().unwrap();
        let err = Project::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidProject { .. }));
    }

    #[test]
    fn test_invalid_version() {
        let dir = project_dir("name: lab\nversion: one\n");
        let err = Project::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidProject { .. }));
    }

    #[test]
    fn test_resolve_relative() {
        let dir = project_dir(CHART);
        let project = Project::load(dir.path()).unwrap();
        assert_eq!(project.resolve("secrets.yaml"), dir.path().join("secrets.yaml"));
        assert_eq!(project.resolve("/etc/x"), PathBuf::from("/etc/x"));
    }
}
