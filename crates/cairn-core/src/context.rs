//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::project::Chart;
use crate::values::Values;
use crate::version::VersionContract;

/// Context available to all templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContext {
    /// Resolved user values
    pub values: JsonValue,

    /// Project metadata
    pub chart: ChartInfo,

    /// Target versions
    pub versions: VersionInfo,

    /// Discovered machine role, empty when lookups are disabled
    pub machine_type: String,
}

/// Project information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
}

impl From<&Chart> for ChartInfo {
    fn from(chart: &Chart) -> Self {
        Self {
            name: chart.name.clone(),
            version: chart.version.to_string(),
        }
    }
}

/// Versions the documents are generated for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Operating system contract, e.g. `v1.7`
    pub os: String,
    pub kubernetes: String,
}

impl VersionInfo {
    pub fn new(contract: VersionContract, kubernetes: &str) -> Self {
        Self {
            os: contract.to_string(),
            kubernetes: kubernetes.trim_start_matches('v').to_string(),
        }
    }
}

impl TemplateContext {
    pub fn new(values: Values, chart: ChartInfo, versions: VersionInfo) -> Self {
        Self {
            values: values.into_inner(),
            chart,
            versions,
            machine_type: String::new(),
        }
    }

    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = machine_type.into();
        self
    }

    /// Convert to a minijinja-compatible value
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
