//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::strvals;

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML (or JSON) file
    ///
    /// An empty file yields empty values. Anything other than a mapping at
    /// the document root is rejected.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| CoreError::value_file(path, e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            CoreError::ValueFile { message, .. } => CoreError::value_file(path, message),
            other => CoreError::value_file(path, other),
        })
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::ValueFile {
                path: "<inline>".to_string(),
                message: format!("expected a mapping at the root, found {}", kind_name(&other)),
            }),
        }
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Merge multiple values in order
    pub fn merge_all(values: Vec<Values>) -> Self {
        let mut result = Values::new();
        for v in values {
            result.merge(&v);
        }
        result
    }

    /// Set a value by dotted path (e.g., "machine.install.disk")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let segments = strvals::parse_key(path)?;
        strvals::assign(&mut self.0, &segments, value, path)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

/// Deep merge `overlay` into `base`
///
/// Mappings merge key-wise, everything else (scalars, sequences, or a
/// mapping meeting a non-mapping) is replaced by the overlay. Shared by
/// value layering and full-document assembly.
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }

    let key = path[0];
    let remaining = &path[1..];

    match value {
        JsonValue::Object(map) => map.get(key).and_then(|v| get_nested(v, remaining)),
        JsonValue::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|idx| items.get(idx))
            .and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

pub fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a sequence",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Kind of an inline value assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    /// `--set`: typed scalars (bool, null, int) and `{a,b}` lists
    Plain,
    /// `--set-string`: every value is a string
    String,
    /// `--set-file`: value is a path whose contents become the string value
    File,
    /// `--set-json`: value is a JSON document
    Json,
    /// `--set-literal`: a single `key=value`, value taken verbatim
    Literal,
}

impl SetKind {
    /// The command line flag this kind comes from
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Plain => "--set",
            Self::String => "--set-string",
            Self::File => "--set-file",
            Self::Json => "--set-json",
            Self::Literal => "--set-literal",
        }
    }
}

/// One inline assignment list, e.g. `--set a.b=1,c=2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSpec {
    pub kind: SetKind,
    pub raw: String,
}

impl SetSpec {
    pub fn new(kind: SetKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    /// Apply this assignment list on top of `target`
    pub fn apply(&self, target: &mut Values) -> Result<()> {
        strvals::apply(&mut target.0, self)
    }
}

/// All value sources of one invocation, in precedence order
#[derive(Debug, Clone, Default)]
pub struct ValueSources {
    /// Project defaults (`values.yaml`), lowest precedence
    pub defaults: Option<PathBuf>,
    /// `--values` files in argument order
    pub files: Vec<PathBuf>,
    /// Inline assignments in argument order, highest precedence
    pub sets: Vec<SetSpec>,
}

impl ValueSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, path: impl Into<PathBuf>) -> Self {
        self.defaults = Some(path.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_set(mut self, spec: SetSpec) -> Self {
        self.sets.push(spec);
        self
    }

    /// Resolve all sources into the final value set
    pub fn resolve(&self) -> Result<Values> {
        let mut values = Values::new();

        if let Some(defaults) = &self.defaults {
            if defaults.exists() {
                values.merge(&Values::from_file(defaults)?);
                tracing::debug!(path = %defaults.display(), "loaded default values");
            } else {
                tracing::debug!(path = %defaults.display(), "no default values file");
            }
        }

        for file in &self.files {
            values.merge(&Values::from_file(file)?);
            tracing::debug!(path = %file.display(), "merged values file");
        }

        for spec in &self.sets {
            spec.apply(&mut values)?;
            tracing::debug!(flag = spec.kind.flag(), "applied inline values");
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
machine:
  install:
    disk: /dev/sda
    wipe: false
podSubnets:
  - 10.244.0.0/16
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
machine:
  install:
    disk: /dev/nvme0n1
  type: worker
podSubnets:
  - 10.10.0.0/16
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("machine.install.disk").unwrap(), "/dev/nvme0n1");
        assert_eq!(base.get("machine.install.wipe").unwrap(), false);
        assert_eq!(base.get("machine.type").unwrap(), "worker");
        assert_eq!(base.get("podSubnets.0").unwrap(), "10.10.0.0/16");
        assert!(base.get("podSubnets.1").is_none());
    }

    #[test]
    fn test_mapping_replaced_by_scalar() {
        let mut base = serde_json::json!({"cni": {"name": "flannel"}});
        deep_merge(&mut base, &serde_json::json!({"cni": "none"}));
        assert_eq!(base, serde_json::json!({"cni": "none"}));
    }

    #[test]
    fn test_merge_keeps_insertion_order() {
        let mut base = Values::from_yaml("b: 1\na: 2\n").unwrap();
        base.merge(&Values::from_yaml("c: 3\na: 4\n").unwrap());
        let keys: Vec<&String> = base.inner().as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("image.tag", JsonValue::String("v1".into())).unwrap();
        values.set("replicas", JsonValue::Number(3.into())).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v1");
        assert_eq!(values.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_from_yaml_rejects_non_mapping() {
        let err = Values::from_yaml("- a\n- b\n").unwrap_err();
        assert!(matches!(err, CoreError::ValueFile { .. }));
    }

    #[test]
    fn test_empty_file_is_empty_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "").unwrap();
        assert!(Values::from_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_values_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "a: [1, 2\n").unwrap();

        let err = Values::from_file(&path).unwrap_err();
        match err {
            CoreError::ValueFile { path: p, .. } => assert!(p.ends_with("broken.yaml")),
            other => panic!("expected ValueFile, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_values_file() {
        let err = Values::from_file("/nonexistent/values.yaml").unwrap_err();
        assert!(matches!(err, CoreError::ValueFile { .. }));
    }

    #[test]
    fn test_resolve_precedence() {
        let dir = TempDir::new().unwrap();
        let defaults = dir.path().join("values.yaml");
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");

        fs::write(
            &defaults,
            "endpoint: https://10.0.0.1:6443\nnetwork:\n  mtu: 1500\n  vlan: 10\nsubnets: [a, b]\n",
        )
        .unwrap();
        fs::write(&first, "network:\n  mtu: 9000\nsubnets: [c]\n").unwrap();
        fs::write(&second, "network:\n  mtu: 1450\n").unwrap();

        let values = ValueSources::new()
            .with_defaults(&defaults)
            .with_file(&first)
            .with_file(&second)
            .with_set(SetSpec::new(SetKind::Plain, "network.vlan=20"))
            .with_set(SetSpec::new(SetKind::String, "network.vlan=30"))
            .resolve()
            .unwrap();

        assert_eq!(values.get("endpoint").unwrap(), "https://10.0.0.1:6443");
        assert_eq!(values.get("network.mtu").unwrap(), 1450);
        // last inline assignment wins, and --set-string keeps it a string
        assert_eq!(values.get("network.vlan").unwrap(), "30");
        assert_eq!(values.get("subnets").unwrap(), &serde_json::json!(["c"]));
    }

    #[test]
    fn test_resolve_inline_order_across_kinds() {
        let values = ValueSources::new()
            .with_set(SetSpec::new(SetKind::Json, r#"disk={"path":"/dev/sda"}"#))
            .with_set(SetSpec::new(SetKind::Plain, "disk.path=/dev/vda"))
            .resolve()
            .unwrap();
        assert_eq!(values.get("disk.path").unwrap(), "/dev/vda");

        let values = ValueSources::new()
            .with_set(SetSpec::new(SetKind::Plain, "disk.path=/dev/vda"))
            .with_set(SetSpec::new(SetKind::Json, r#"disk={"path":"/dev/sda"}"#))
            .resolve()
            .unwrap();
        assert_eq!(values.get("disk.path").unwrap(), "/dev/sda");
    }

    #[test]
    fn test_resolve_missing_defaults_is_ok() {
        let values = ValueSources::new()
            .with_defaults("/nonexistent/values.yaml")
            .resolve()
            .unwrap();
        assert!(values.is_empty());
    }
}
